//! # Blockflow Core
//!
//! A block-diagram simulation engine.
//!
//! Models are hierarchical networks of blocks (integrators, gains, delays,
//! arithmetic combiners, memories) connected by named signals. The engine
//! evaluates the resulting dataflow graph at successive time points and
//! integrates the state variables forward with a pluggable ODE stepper.
//!
//! ## Architecture
//!
//! - [`signal`] - Signal registry: typed value cells with write-once-per-pass semantics
//! - [`block`] - The `Block` trait, the model tree and the dataflow scheduler
//! - [`blocks`] - Library of leaf blocks
//! - [`solver`] - Steppers, state bookkeeping, the simulator run loop and history
//! - [`scenarios`] - Demonstration models (CLI only)
//!
//! ## Usage
//!
//! ```no_run
//! use blockflow_core::blocks::{Gain, Integrator};
//! use blockflow_core::solver::{Rk4, Simulator};
//! use blockflow_core::Model;
//!
//! # fn main() -> blockflow_core::Result<()> {
//! let mut model = Model::new("decay");
//! let root = model.root();
//! let x = model.scalar(root, "x")?;
//! let xd = model.scalar(root, "xd")?;
//! model.add_block(root, "state", Integrator::new(1.0), &[xd], &[x])?;
//! model.add_block(root, "rate", Gain::new(-0.5), &[x], &[xd])?;
//!
//! let mut sim = Simulator::new(model, Some(Box::new(Rk4::new())));
//! sim.init(0.0)?;
//! sim.run(1.0)?;
//! println!("x(1) = {}", sim.signals().get_scalar(x)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Evaluation Method
//!
//! For each requested time the simulator:
//!
//! 1. Clears every signal and lets the input callback write exogenous values
//! 2. Primes the state variables and runs scheduling passes, each block
//!    firing once its dependencies are assigned, until every block has run
//! 3. Advances the state with the stepper, which re-runs step 2 for each
//!    derivative evaluation and may reject and retry a step
//! 4. Re-evaluates the model at the accepted state and lets blocks capture
//!    history (`post_step`)

pub mod block;
pub mod blocks;
pub mod error;
pub mod signal;
pub mod solver;

#[cfg(feature = "cli")]
pub mod scenarios;

// Re-export main types for convenience
pub use block::{Block, Model, Scheduler, SchedulingMode};
pub use error::{FlowError, Result};
pub use signal::{SignalId, SignalKind, SignalRegistry, Value};
pub use solver::{History, Simulator, SimulatorConfig, Stepper};
