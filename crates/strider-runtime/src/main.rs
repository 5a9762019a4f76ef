//! `strider` – assemble the control pipeline from a config file and run
//! it in simulation for a fixed number of cycles.
//!
//! Usage: `strider <robot.toml> [cycles]`

use std::path::PathBuf;
use std::process::ExitCode;

use strider_runtime::topology::{assemble_from_path, PipelineOptions};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let _guard = strider_runtime::telemetry::init_tracing("strider");

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: strider <robot.toml> [cycles]");
        return ExitCode::FAILURE;
    };
    let cycles: u64 = match args.next().map(|s| s.parse()).transpose() {
        Ok(n) => n.unwrap_or(1000),
        Err(e) => {
            eprintln!("invalid cycle count: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config_path, cycles) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pipeline failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &std::path::Path, cycles: u64) -> Result<(), strider_types::StriderError> {
    let mut pipeline = assemble_from_path(config_path, PipelineOptions::simulation())?;
    for degradation in pipeline.degradations() {
        warn!(destination = %degradation.destination, detail = %degradation.detail, "assembled degraded");
    }

    for _ in 0..cycles {
        pipeline.run_cycle()?;
    }
    let events = pipeline.drain_events()?;
    info!(cycles, events = events.len(), "simulation finished");
    for event in events {
        info!(?event, "arbitration event");
    }
    Ok(())
}
