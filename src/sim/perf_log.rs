use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::sdram::stats::ControllerStats;
use crate::sim::device::DeviceAudit;
use crate::traffic::driver::TrafficSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimSummary {
    pub cycles: u64,
    pub timed_out: bool,
    pub controller: ControllerStats,
    pub row_hit_rate: f64,
    /// `None` when no device model was attached.
    pub device: Option<DeviceAudit>,
    pub traffic: TrafficSummary,
}

impl SimSummary {
    pub fn violations(&self) -> u64 {
        self.device.map_or(0, |audit| audit.total())
    }

    /// Drained without timing out, no read mismatched and the device saw no protocol error.
    pub fn passed(&self) -> bool {
        !self.timed_out && self.traffic.mismatches == 0 && self.violations() == 0
    }
}

pub fn write_summary(path: &Path, summary: &SimSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)
        .with_context(|| format!("cannot serialize summary to {}", path.display()))?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
