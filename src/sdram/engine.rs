use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::sdram::addr::MappedAddress;
use crate::sdram::command::{mode_register_word, Command};
use crate::sdram::config::SdramConfig;
use crate::sdram::datapath::DataStrobes;

/// Command engine states. Timed waits are held inside the issuing state while the timer
/// counts down; there are no separate wait states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    InitPrechargeAll,
    InitLoadMode,
    InitRefresh1,
    InitRefresh2,
    PrechargeBank,
    Activate,
    Write,
    WriteRecovery,
    Read,
    AutoRefresh,
}

/// A request after address decomposition, as held by the engine while in service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRequest {
    pub mapped: MappedAddress,
    pub is_write: bool,
    pub write_data: Option<u32>,
    pub dqm: u8,
}

/// Everything the engine samples in one cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineInputs {
    pub init_req: bool,
    pub refresh_req: bool,
    /// Request offered by the bus side this cycle.
    pub request: Option<ActiveRequest>,
}

/// What the idle state picks up, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Init,
    Refresh,
    Request(ActiveRequest),
    Nothing,
}

/// Row-buffer outcome of an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowOutcome {
    /// Requested row already open.
    Hit,
    /// Bank had no open row.
    Empty,
    /// Another row open in the bank; precharge first.
    Conflict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOutputs {
    pub command: Command,
    pub dqm: u8,
    pub strobes: DataStrobes,
    pub controller_ready: bool,
    /// One-cycle acknowledgment of the init request.
    pub init_ack: bool,
    /// The offered request was taken this cycle.
    pub accepted: bool,
    pub row_outcome: Option<RowOutcome>,
    /// First cycle of the current state.
    pub first_cycle: bool,
}

#[derive(Debug)]
pub struct EngineRegs {
    fsm: EngineState,
    timer: u32,
    /// First cycle in `fsm`.
    entered: bool,
    /// Open row per bank.
    banks: Vec<Option<u32>>,
    current: Option<ActiveRequest>,
    /// Set when a refresh is granted, cleared when its auto-refresh completes.
    refresh_in_progress: bool,
    initialized: bool,
}

impl EngineRegs {
    fn new(num_banks: usize) -> Self {
        Self {
            fsm: EngineState::Idle,
            timer: 0,
            entered: false,
            banks: vec![None; num_banks],
            current: None,
            refresh_in_progress: false,
            initialized: false,
        }
    }
}

impl Default for EngineRegs {
    fn default() -> Self {
        Self::new(0)
    }
}

/// The controller's central state machine: owns bank state, the shared wait timer and the
/// request in service, and arbitrates init > refresh > bus request while idle.
pub struct CommandEngine {
    base: ModuleBase<EngineRegs, SdramConfig>,
}

module!(CommandEngine, EngineRegs, SdramConfig,);

impl ModuleBehaviors for CommandEngine {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state = EngineRegs::new(self.conf().geometry.num_banks());
        self.base.cycle = 0;
    }
}

impl CommandEngine {
    pub fn new(config: Arc<SdramConfig>) -> Self {
        let mut me = CommandEngine {
            base: ModuleBase::default(),
        };
        me.init_conf(config);
        me.reset();
        me
    }

    pub fn fsm_state(&self) -> EngineState {
        self.base.state.fsm
    }

    pub fn timer(&self) -> u32 {
        self.base.state.timer
    }

    pub fn is_idle(&self) -> bool {
        self.base.state.fsm == EngineState::Idle
    }

    pub fn controller_ready(&self) -> bool {
        self.is_idle() && !self.base.state.refresh_in_progress
    }

    pub fn refresh_in_progress(&self) -> bool {
        self.base.state.refresh_in_progress
    }

    pub fn initialized(&self) -> bool {
        self.base.state.initialized
    }

    /// Open row of `bank`, `None` when the bank is precharged.
    pub fn open_row(&self, bank: u32) -> Option<u32> {
        self.base.state.banks.get(bank as usize).copied().flatten()
    }

    pub fn current(&self) -> Option<&ActiveRequest> {
        self.base.state.current.as_ref()
    }

    /// Fixed-priority pick for the idle state.
    pub fn select(&self, inputs: &EngineInputs) -> Service {
        if !self.is_idle() {
            return Service::Nothing;
        }
        if inputs.init_req {
            Service::Init
        } else if self.base.state.refresh_in_progress || inputs.refresh_req {
            Service::Refresh
        } else if let Some(request) = inputs.request {
            Service::Request(request)
        } else {
            Service::Nothing
        }
    }

    pub fn classify(&self, mapped: &MappedAddress) -> RowOutcome {
        match self.open_row(mapped.bank) {
            Some(row) if row == mapped.row => RowOutcome::Hit,
            Some(_) => RowOutcome::Conflict,
            None => RowOutcome::Empty,
        }
    }

    /// Combinational outputs for the current cycle.
    pub fn outputs(&self, inputs: &EngineInputs) -> EngineOutputs {
        let regs = &self.base.state;
        let service = self.select(inputs);
        let current = regs.current;

        let command = match (regs.fsm, current) {
            (EngineState::InitPrechargeAll, _) if regs.entered => Command::PrechargeAll,
            (EngineState::InitLoadMode, _) if regs.entered => Command::LoadMode {
                value: mode_register_word(&self.conf().timing, &self.conf().mode),
            },
            (EngineState::InitRefresh1 | EngineState::InitRefresh2, _) if regs.entered => {
                Command::AutoRefresh
            }
            // held for the whole refresh cycle time
            (EngineState::AutoRefresh, _) => Command::AutoRefresh,
            (EngineState::PrechargeBank, Some(req)) if regs.entered => Command::Precharge {
                bank: req.mapped.bank,
            },
            (EngineState::Activate, Some(req)) if regs.entered => Command::Activate {
                bank: req.mapped.bank,
                row: req.mapped.row,
            },
            (EngineState::Write, Some(req)) => Command::Write {
                bank: req.mapped.bank,
                col: req.mapped.col,
            },
            (EngineState::Read, Some(req)) if regs.entered => Command::Read {
                bank: req.mapped.bank,
                col: req.mapped.col,
            },
            _ => Command::Nop,
        };

        let writing = regs.fsm == EngineState::Write;
        let reading = regs.fsm == EngineState::Read;
        EngineOutputs {
            command,
            dqm: match (writing, current) {
                (true, Some(req)) => req.dqm,
                _ => 0,
            },
            strobes: DataStrobes {
                write_active: writing,
                read_active: reading,
                read_data_valid: reading && regs.timer == 0,
                write_data: current.filter(|_| writing).and_then(|req| req.write_data),
            },
            controller_ready: self.controller_ready(),
            init_ack: service == Service::Init,
            accepted: matches!(service, Service::Request(_)),
            row_outcome: match service {
                Service::Request(req) => Some(self.classify(&req.mapped)),
                _ => None,
            },
            first_cycle: regs.entered,
        }
    }

    /// Clock edge.
    pub fn update(&mut self, inputs: &EngineInputs) {
        let timing = self.conf().timing;
        let service = self.select(inputs);
        let cycle = self.base.cycle;
        let regs = &mut self.base.state;

        if inputs.refresh_req {
            regs.refresh_in_progress = true;
        }

        let expired = regs.timer == 0;
        let access = |req: &ActiveRequest| {
            if req.is_write {
                (EngineState::Write, 0)
            } else {
                (EngineState::Read, timing.cas_latency)
            }
        };

        let next = match regs.fsm {
            EngineState::Idle => match service {
                Service::Init => {
                    debug!("engine: init sequence started at cycle {}", cycle);
                    Some((EngineState::InitPrechargeAll, timing.precharge_period))
                }
                Service::Refresh => {
                    debug!("engine: auto-refresh at cycle {}", cycle);
                    regs.refresh_in_progress = true;
                    Some((EngineState::AutoRefresh, timing.refresh_cycle_time))
                }
                Service::Request(req) => {
                    regs.current = Some(req);
                    let bank = req.mapped.bank as usize;
                    debug_assert!(bank < regs.banks.len());
                    match regs.banks[bank] {
                        Some(row) if row == req.mapped.row => Some(access(&req)),
                        Some(_) => Some((EngineState::PrechargeBank, timing.precharge_period)),
                        None => Some((EngineState::Activate, timing.activate_delay)),
                    }
                }
                Service::Nothing => None,
            },
            EngineState::InitPrechargeAll if expired => {
                regs.banks.iter_mut().for_each(|row| *row = None);
                Some((EngineState::InitLoadMode, timing.mode_load_delay))
            }
            EngineState::InitLoadMode if expired => {
                Some((EngineState::InitRefresh1, timing.refresh_cycle_time))
            }
            EngineState::InitRefresh1 if expired => {
                Some((EngineState::InitRefresh2, timing.refresh_cycle_time))
            }
            EngineState::InitRefresh2 if expired => {
                debug!("engine: init sequence done at cycle {}", cycle);
                regs.initialized = true;
                Some((EngineState::Idle, 0))
            }
            EngineState::PrechargeBank if expired => {
                if let Some(req) = regs.current {
                    regs.banks[req.mapped.bank as usize] = None;
                }
                Some((EngineState::Activate, timing.activate_delay))
            }
            EngineState::Activate if expired => match regs.current {
                Some(req) => {
                    regs.banks[req.mapped.bank as usize] = Some(req.mapped.row);
                    Some(access(&req))
                }
                None => Some((EngineState::Idle, 0)),
            },
            EngineState::Write => Some((EngineState::WriteRecovery, timing.write_recovery)),
            EngineState::WriteRecovery | EngineState::Read if expired => {
                regs.current = None;
                Some((EngineState::Idle, 0))
            }
            EngineState::AutoRefresh if expired => {
                regs.refresh_in_progress = false;
                Some((EngineState::Idle, 0))
            }
            _ => None,
        };

        match next {
            Some((fsm, timer)) => {
                regs.fsm = fsm;
                regs.timer = timer;
                regs.entered = true;
            }
            None => {
                regs.entered = false;
                regs.timer = regs.timer.saturating_sub(1);
            }
        }
    }
}
