use std::process::ExitCode;

use clap::Parser;
use env_logger::Builder;
use log::{error, LevelFilter};

use sdramctl::ui::{log_level, make_sim, read_toml, SdramArgs};

fn level_filter(level: u64) -> LevelFilter {
    match level {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

fn run(argv: &SdramArgs, config: &str) -> anyhow::Result<bool> {
    let mut sim = make_sim(config, Some(argv))?;
    let summary = sim.simulate()?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary.passed())
}

pub fn main() -> ExitCode {
    let argv = SdramArgs::parse();
    let config = match read_toml(&argv.config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::from(2);
        }
    };

    // RUST_LOG wins unless --log is given
    let mut builder = Builder::from_default_env();
    if argv.log.is_some() || std::env::var_os("RUST_LOG").is_none() {
        if let Ok(level) = log_level(&config, &argv) {
            builder.filter_level(level_filter(level));
        }
    }
    builder.init();

    match run(&argv, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}
