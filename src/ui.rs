use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use toml::Table;

use crate::sdram::config::SdramConfig;
use crate::sim::config::{Config, SimConfig};
use crate::sim::top::Sim;
use crate::traffic::config::{PatternKind, TrafficConfig};

#[derive(Parser)]
#[command(version, about)]
pub struct SdramArgs {
    #[arg(help = "Path to config.toml")]
    pub config_path: PathBuf,
    #[arg(long, help = "Override traffic pattern (sequential, row_hit, row_conflict, random)")]
    pub pattern: Option<PatternKind>,
    #[arg(long, help = "Override number of generated requests")]
    pub num_requests: Option<u32>,
    #[arg(long, help = "Override traffic RNG seed")]
    pub seed: Option<u64>,
    #[arg(long, help = "Override cycle timeout")]
    pub timeout: Option<u64>,
    #[arg(long, help = "Enable log at level (0:none, 1:info, 2:debug)")]
    pub log: Option<u64>,
    #[arg(long, help = "Print the issued command trace")]
    pub gen_trace: Option<bool>,
    #[arg(long, help = "Write the run summary as JSON to this path")]
    pub summary_json: Option<PathBuf>,
}

pub fn read_toml(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))
}

/// Log level requested on the command line, else by the `[sim]` section.
pub fn log_level(toml_string: &str, cli_args: &SdramArgs) -> anyhow::Result<u64> {
    if let Some(level) = cli_args.log {
        return Ok(level);
    }
    let config_table: Table = toml::from_str(toml_string).context("cannot parse config toml")?;
    Ok(SimConfig::from_section(config_table.get("sim"))?.log_level)
}

/// Make a Sim object from the TOML configuration.
/// If `cli_args` is given, override TOML options with CLI arguments.
pub fn make_sim(toml_string: &str, cli_args: Option<&SdramArgs>) -> anyhow::Result<Sim> {
    let config_table: Table = toml::from_str(toml_string).context("cannot parse config toml")?;
    let mut sim_config = SimConfig::from_section(config_table.get("sim"))?;
    let sdram_config = SdramConfig::from_section(config_table.get("sdram"))?;
    let mut traffic_config = TrafficConfig::from_section(config_table.get("traffic"))?;

    // override toml configs with CLI args
    if let Some(args) = cli_args {
        sim_config.log_level = args.log.unwrap_or(sim_config.log_level);
        sim_config.trace = args.gen_trace.unwrap_or(sim_config.trace);
        sim_config.timeout = args.timeout.unwrap_or(sim_config.timeout);
        if args.summary_json.is_some() {
            sim_config.summary_json = args.summary_json.clone();
        }
        traffic_config.pattern = args.pattern.unwrap_or(traffic_config.pattern);
        traffic_config.num_requests = args.num_requests.unwrap_or(traffic_config.num_requests);
        traffic_config.seed = args.seed.unwrap_or(traffic_config.seed);
    }

    Sim::new(sim_config, sdram_config, traffic_config)
}
