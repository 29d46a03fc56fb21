use std::sync::Arc;

use log::{info, warn};

use crate::base::behavior::*;
use crate::sdram::config::SdramConfig;
use crate::sdram::controller::{ControllerInputs, SdramController};
use crate::sim::config::SimConfig;
use crate::sim::device::BehavioralSdram;
use crate::sim::perf_log::{write_summary, SimSummary};
use crate::sim::trace::Tracer;
use crate::traffic::config::TrafficConfig;
use crate::traffic::driver::SdramTrafficDriver;

/// Controller, device model and requester advanced in one clock domain.
pub struct Sim {
    pub config: SimConfig,
    pub controller: SdramController,
    pub device: Option<BehavioralSdram>,
    pub driver: SdramTrafficDriver,
    pub tracer: Tracer,
    cycle: u64,
}

impl Sim {
    pub fn new(
        sim_config: SimConfig,
        sdram_config: SdramConfig,
        traffic_config: TrafficConfig,
    ) -> anyhow::Result<Sim> {
        // patterns are sized from the geometry
        sdram_config.validate()?;
        let driver = SdramTrafficDriver::new(&traffic_config, &sdram_config.geometry);
        Self::with_driver(sim_config, sdram_config, driver)
    }

    pub fn with_driver(
        sim_config: SimConfig,
        sdram_config: SdramConfig,
        driver: SdramTrafficDriver,
    ) -> anyhow::Result<Sim> {
        let device = sim_config
            .device
            .then(|| BehavioralSdram::new(Arc::new(sdram_config)));
        Ok(Sim {
            controller: SdramController::new(sdram_config)?,
            device,
            driver,
            tracer: Tracer::new(),
            config: sim_config,
            cycle: 0,
        })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn finished(&self) -> bool {
        self.driver.is_done()
    }

    /// Run until the request stream drains or the timeout expires.
    pub fn simulate(&mut self) -> anyhow::Result<SimSummary> {
        while !self.finished() && self.cycle < self.config.timeout {
            self.tick_one();
        }
        let timed_out = !self.finished();
        if timed_out {
            warn!(
                "timeout after {} cycles, {} requests still pending",
                self.cycle,
                self.driver.remaining()
            );
        }

        if self.config.trace {
            while let Some(line) = self.tracer.consume() {
                println!("{}", line);
            }
        }

        let stats = *self.controller.stats();
        let summary = SimSummary {
            cycles: self.cycle,
            timed_out,
            controller: stats,
            row_hit_rate: stats.row_hit_rate(),
            device: self.device.as_ref().map(|device| *device.audit()),
            traffic: *self.driver.summary(),
        };
        info!(
            "simulation finished at cycle {}: {} accepted, {} refreshes, row hit rate {:.3}",
            summary.cycles,
            stats.accepted(),
            stats.refreshes(),
            summary.row_hit_rate
        );

        if let Some(path) = &self.config.summary_json {
            write_summary(path, &summary)?;
            info!("summary written to {}", path.display());
        }
        Ok(summary)
    }
}

impl ModuleBehaviors for Sim {
    fn tick_one(&mut self) {
        let cycle = self.cycle;
        let dq_in = self.device.as_ref().and_then(BehavioralSdram::dq_out);
        let request = self.driver.offer(self.controller.initialized());

        let outputs = self.controller.step(ControllerInputs { request, dq_in });

        if let Some(device) = self.device.as_mut() {
            device.drive(outputs.bus, outputs.dq_out);
            device.tick_one();
        }
        if self.config.trace {
            self.tracer.record(cycle, outputs.command);
        }
        self.driver.observe(cycle, &outputs);
        self.cycle += 1;
    }

    fn reset(&mut self) {
        self.controller.reset();
        if let Some(device) = self.device.as_mut() {
            device.reset();
        }
        self.driver.drop_in_flight();
        self.tracer = Tracer::new();
        self.cycle = 0;
    }
}
