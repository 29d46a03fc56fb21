use std::path::PathBuf;

use anyhow::Context;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        match section {
            Some(value) => value
                .clone()
                .try_into()
                .with_context(|| format!("cannot deserialize {}", std::any::type_name::<Self>())),
            None => {
                warn!("config section for {} not found, using defaults", std::any::type_name::<Self>());
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    /// 0: none, 1: info, 2: debug
    pub log_level: u64,
    /// Hard cycle limit for one run.
    pub timeout: u64,
    /// Record and print every issued device command.
    pub trace: bool,
    /// Attach the behavioral device model to the physical side.
    pub device: bool,
    pub summary_json: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            log_level: 0,
            timeout: 1_000_000,
            trace: false,
            device: true,
            summary_json: None,
        }
    }
}
