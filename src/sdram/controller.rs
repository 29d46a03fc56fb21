use std::sync::Arc;

use log::{debug, warn};

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::sdram::addr::AddressMapper;
use crate::sdram::command::{byte_mask, Command, CommandBus};
use crate::sdram::config::SdramConfig;
use crate::sdram::datapath::DataPathArbiter;
use crate::sdram::engine::{ActiveRequest, CommandEngine, EngineInputs};
use crate::sdram::init::InitSequencer;
use crate::sdram::refresh::RefreshTimer;
use crate::sdram::stats::ControllerStats;

/// Normalized bus-side request, one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusRequest {
    pub address: u32,
    pub is_write: bool,
    /// Access size in bytes; 0 means a full beat.
    pub size: u32,
    /// Carried for the adapter; the core moves one beat per request.
    pub burst: u32,
    pub write_data: Option<u32>,
}

impl BusRequest {
    pub fn read(address: u32) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn write(address: u32, data: u32) -> Self {
        Self {
            address,
            is_write: true,
            write_data: Some(data),
            ..Self::default()
        }
    }
}

/// Inputs sampled at the start of a cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerInputs {
    /// `Some` when the requester asserts valid.
    pub request: Option<BusRequest>,
    /// Value the device drives on DQ, `None` when it is not driving.
    pub dq_in: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerOutputs {
    pub controller_ready: bool,
    pub accepted: bool,
    pub read_data_valid: bool,
    pub read_data: u32,
    /// Reserved; never asserted.
    pub error: bool,
    pub command: Command,
    pub bus: CommandBus,
    pub dq_out: Option<u32>,
}

#[derive(Debug, Default)]
pub struct ControllerIo {
    inputs: ControllerInputs,
    outputs: ControllerOutputs,
}

/// SDRAM controller core: address mapper, refresh timer, init sequencer, command engine and
/// data path, advanced in lock-step.
///
/// Every component computes its outputs from the register snapshot at the start of the
/// cycle; all registers then commit together at the clock edge.
pub struct SdramController {
    base: ModuleBase<ControllerIo, SdramConfig>,
    mapper: AddressMapper,
    refresh: RefreshTimer,
    init: InitSequencer,
    engine: CommandEngine,
    datapath: DataPathArbiter,
    stats: ControllerStats,
}

module!(SdramController, ControllerIo, SdramConfig,);

impl ModuleBehaviors for SdramController {
    fn tick_one(&mut self) {
        let inputs = self.base.state.inputs;

        // snapshot
        let engine_idle = self.engine.is_idle();
        let ready = self.engine.controller_ready();
        let engine_in = EngineInputs {
            init_req: self.init.request(),
            refresh_req: self.refresh.request(ready),
            request: inputs.request.and_then(|req| self.admit(&req, ready)),
        };
        let eng = self.engine.outputs(&engine_in);
        let data = self.datapath.evaluate(eng.strobes, inputs.dq_in);

        let outputs = ControllerOutputs {
            controller_ready: eng.controller_ready,
            accepted: eng.accepted,
            read_data_valid: data.read_data_valid,
            read_data: data.read_data,
            error: false,
            command: eng.command,
            bus: eng.command.encode(&self.conf().encoding, eng.dqm),
            dq_out: data.dq_out,
        };

        self.stats.record_cycle(
            self.refresh.is_due() && !ready,
            ready && inputs.request.is_none(),
        );
        self.stats.record_command(&eng.command, eng.first_cycle);
        if let Some(outcome) = eng.row_outcome {
            self.stats.record_accept(outcome);
        }

        // clock edge
        self.refresh.update(ready);
        self.init.update(engine_idle, eng.init_ack);
        self.engine.update(&engine_in);
        self.refresh.tick_one();
        self.init.tick_one();
        self.engine.tick_one();
        self.base.cycle += 1;

        self.base.state.outputs = outputs;
    }

    fn reset(&mut self) {
        self.refresh.reset();
        self.init.reset();
        self.engine.reset();
        self.datapath.reset();
        self.stats = ControllerStats::default();
        self.base.state = ControllerIo::default();
        self.base.cycle = 0;
    }
}

impl SdramController {
    /// Build a controller in its reset state. Fails on an inconsistent configuration.
    pub fn new(config: SdramConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let timing = Arc::new(config.timing);
        let mut me = SdramController {
            base: ModuleBase::default(),
            mapper: AddressMapper::new(&config.geometry),
            refresh: RefreshTimer::new(Arc::clone(&timing)),
            init: InitSequencer::new(timing),
            engine: CommandEngine::new(Arc::clone(&config)),
            datapath: DataPathArbiter::new(),
            stats: ControllerStats::default(),
        };
        me.init_conf(config);
        Ok(me)
    }

    /// Drive `inputs` for one cycle and return what the controller presented during it.
    pub fn step(&mut self, inputs: ControllerInputs) -> ControllerOutputs {
        self.base.state.inputs = inputs;
        self.tick_one();
        self.base.state.outputs
    }

    /// Decompose an offered request for the engine. Writes without data are never offered.
    fn admit(&self, req: &BusRequest, ready: bool) -> Option<ActiveRequest> {
        let geometry = &self.conf().geometry;
        if req.is_write && req.write_data.is_none() {
            if ready {
                warn!("rejecting write to {:#x} without write data", req.address);
            }
            return None;
        }
        if req.burst > 1 && ready {
            debug!("burst of {} at {:#x} serviced as a single beat", req.burst, req.address);
        }
        let dqm = if req.is_write {
            let lanes = geometry.data_bytes();
            let offset = self.mapper.byte_offset(req.address);
            if ready && req.size < lanes && offset + req.size > lanes {
                warn!(
                    "{}-byte write at {:#x} crosses the beat, upper bytes dropped",
                    req.size, req.address
                );
            }
            byte_mask(geometry, req.size, offset)
        } else {
            0
        };
        Some(ActiveRequest {
            mapped: self.mapper.map(req.address),
            is_write: req.is_write,
            write_data: req.write_data.map(|data| data & geometry.data_mask()),
            dqm,
        })
    }

    /// Outputs of the most recent cycle.
    pub fn outputs(&self) -> &ControllerOutputs {
        &self.base.state.outputs
    }

    pub fn controller_ready(&self) -> bool {
        self.engine.controller_ready()
    }

    /// The init sequence has run to completion since the last reset.
    pub fn initialized(&self) -> bool {
        self.engine.initialized()
    }

    pub fn mapper(&self) -> &AddressMapper {
        &self.mapper
    }

    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    pub fn refresh_timer(&self) -> &RefreshTimer {
        &self.refresh
    }

    pub fn init_sequencer(&self) -> &InitSequencer {
        &self.init
    }

    pub fn datapath(&self) -> &DataPathArbiter {
        &self.datapath
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }
}
