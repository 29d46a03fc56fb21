use std::sync::Arc;

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::sdram::config::TimingConfig;

#[derive(Debug, Default)]
pub struct RefreshState {
    /// Zero means a refresh is due.
    countdown: u32,
}

/// Free-running refresh countdown.
///
/// When the count reaches zero the timer raises a one-cycle request in the first cycle the
/// system is ready, then reloads. While the system is busy the count stays parked at zero, so
/// a due refresh is deferred but never dropped.
pub struct RefreshTimer {
    base: ModuleBase<RefreshState, TimingConfig>,
}

module!(RefreshTimer, RefreshState, TimingConfig,);

impl ModuleBehaviors for RefreshTimer {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        // first refresh is due right out of reset
        self.base.state.countdown = 0;
        self.base.cycle = 0;
    }
}

impl RefreshTimer {
    pub fn new(config: Arc<TimingConfig>) -> Self {
        let mut me = RefreshTimer {
            base: ModuleBase::default(),
        };
        me.init_conf(config);
        me
    }

    /// Combinational request pulse for the current cycle.
    pub fn request(&self, system_ready: bool) -> bool {
        self.base.state.countdown == 0 && system_ready
    }

    pub fn is_due(&self) -> bool {
        self.base.state.countdown == 0
    }

    pub fn countdown(&self) -> u32 {
        self.base.state.countdown
    }

    /// Clock edge.
    pub fn update(&mut self, system_ready: bool) {
        let reload = self.conf().refresh_interval - 1;
        let state = &mut self.base.state;
        if state.countdown > 0 {
            state.countdown -= 1;
        } else if system_ready {
            state.countdown = reload;
        }
    }
}
