use std::sync::Arc;

use log::debug;

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::sdram::config::TimingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// Waiting out the power-up delay.
    Counting,
    /// Request raised, waiting for the engine to acknowledge.
    Requesting,
    /// Acknowledged; stays here until the next reset.
    Done,
}

#[derive(Debug, Default)]
pub struct InitState {
    countdown: u32,
    request: bool,
    done: bool,
}

/// One-shot power-up sequencer. Asks the command engine to run the device init sequence
/// exactly once per reset.
pub struct InitSequencer {
    base: ModuleBase<InitState, TimingConfig>,
}

module!(InitSequencer, InitState, TimingConfig,);

impl ModuleBehaviors for InitSequencer {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state = InitState {
            countdown: self.conf().power_up_delay,
            request: false,
            done: false,
        };
        self.base.cycle = 0;
    }
}

impl InitSequencer {
    pub fn new(config: Arc<TimingConfig>) -> Self {
        let mut me = InitSequencer {
            base: ModuleBase::default(),
        };
        me.init_conf(config);
        me.reset();
        me
    }

    /// Registered request output.
    pub fn request(&self) -> bool {
        self.base.state.request
    }

    pub fn is_done(&self) -> bool {
        self.base.state.done
    }

    pub fn phase(&self) -> InitPhase {
        let state = &self.base.state;
        if state.done {
            InitPhase::Done
        } else if state.request {
            InitPhase::Requesting
        } else {
            InitPhase::Counting
        }
    }

    /// Clock edge. `engine_ack` is the engine's one-cycle acknowledgment of the request.
    pub fn update(&mut self, engine_idle: bool, engine_ack: bool) {
        let cycle = self.base.cycle;
        let state = &mut self.base.state;
        if state.done {
            return;
        }
        if state.request {
            if engine_ack {
                debug!("init: request acknowledged at cycle {}", cycle);
                state.request = false;
                state.done = true;
            }
        } else if state.countdown > 0 {
            state.countdown -= 1;
        } else if engine_idle {
            debug!("init: power-up delay elapsed, requesting init at cycle {}", cycle);
            state.request = true;
        }
    }
}
