use std::str::FromStr;

use serde::Deserialize;

use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Write a linear block, then read it back.
    #[default]
    Sequential,
    /// Alternate writes and reads inside one open row.
    RowHit,
    /// Ping-pong between two rows of the same bank.
    RowConflict,
    /// Uniform addresses, mixed sizes, `write_ratio` writes.
    Random,
}

impl FromStr for PatternKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sequential" => Ok(Self::Sequential),
            "row_hit" => Ok(Self::RowHit),
            "row_conflict" => Ok(Self::RowConflict),
            "random" => Ok(Self::Random),
            _ => Err(format!(
                "unsupported pattern '{}', expected one of: sequential, row_hit, row_conflict, random",
                value
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    pub pattern: PatternKind,
    pub num_requests: u32,
    pub seed: u64,
    pub base_address: u32,
    pub write_ratio: f64,
    /// Keep requests back until the init sequence has completed.
    pub wait_for_init: bool,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: PatternKind::Sequential,
            num_requests: 256,
            seed: 0,
            base_address: 0,
            write_ratio: 0.5,
            wait_for_init: true,
        }
    }
}
