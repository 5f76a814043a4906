//! Blockflow - block-diagram simulation demos
//!
//! Runs one of the built-in scenarios and writes the recorded signals as CSV.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug blockflow mass-spring --stepper rk4 --t-end 5 --dt 0.01 --output mass_spring.csv
//! ```

use std::io;
use std::path::PathBuf;

use blockflow_core::{
    error::Result,
    scenarios::{run_scenario, ScenarioKind, StepperKind},
    SimulatorConfig,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Block-diagram simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to simulate
    #[arg(value_enum)]
    scenario: ScenarioKind,

    /// Integration method
    #[arg(short, long, value_enum, default_value_t = StepperKind::Rk4)]
    stepper: StepperKind,

    /// End time of the simulation
    #[arg(long, default_value_t = 10.0)]
    t_end: f64,

    /// Output time step
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// Replay the cached block evaluation order between passes
    #[arg(long)]
    reuse_order: bool,

    /// CSV output file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let scenario = args.scenario.build()?;
    let config = SimulatorConfig::new().with_reuse_order(args.reuse_order);
    let history = run_scenario(scenario, args.stepper.build(), args.t_end, args.dt, config)?;

    match &args.output {
        Some(path) => history.export_csv_file(path)?,
        None => history
            .export_csv(io::stdout().lock())
            .map_err(|source| blockflow_core::FlowError::FileWriteError {
                path: "<stdout>".to_string(),
                source,
            })?,
    }

    Ok(())
}
