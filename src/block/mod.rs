//! Blocks, the model tree, and the dataflow scheduler.
//!
//! A [`Model`] owns a tree of blocks. Parents (the model and its
//! submodels) only group and name their children; leaves implement
//! [`Block`] and do the computation. Leaves are bound to signals with
//! [`Model::connect`] and evaluated by the [`Scheduler`], which runs each
//! leaf once per pass as soon as its dependencies are assigned.

mod model;
mod naming;
mod scheduler;
mod types;
mod validate;

pub use model::{BlockRef, Model};
pub use naming::{check_name, NamingIssue, Renamed, RESERVED_CHARS, SIGNAL_SEPARATOR};
pub use scheduler::{Scheduler, SchedulerStats, SchedulingMode};
pub use types::{Arity, BlockContext, BlockId, BlockIo};
pub use validate::validate_model;

use crate::error::Result;
use crate::signal::SignalRegistry;

/// A leaf computation in the dataflow graph.
///
/// The scheduler calls [`activation_function`](Block::activation_function)
/// once per pass, after every signal in [`BlockIo::dependencies`] has been
/// assigned. It must write each of its outputs exactly once, unless the
/// output is a state variable already primed by the stepper.
///
/// `pre_step` and `post_step` run once per accepted time step rather than
/// once per pass. Stateful blocks use them to prime and capture state.
pub trait Block {
    /// Short lowercase type name, used to generate block names.
    fn type_name(&self) -> &'static str;

    fn num_inputs(&self) -> Arity {
        Arity::Unlimited
    }

    fn num_outputs(&self) -> Arity {
        Arity::Unlimited
    }

    /// Called once when the block is bound to its signals. Blocks may
    /// validate signal kinds, link state variables, or narrow their
    /// scheduling dependencies here.
    fn connect(&mut self, _io: &mut BlockIo, _signals: &mut SignalRegistry) -> Result<()> {
        Ok(())
    }

    /// Compute outputs from inputs at time `t`.
    fn activation_function(&mut self, t: f64, ctx: &mut BlockContext<'_>) -> Result<()>;

    fn pre_step(&mut self, _t: f64, _ctx: &mut BlockContext<'_>) -> Result<()> {
        Ok(())
    }

    fn post_step(&mut self, _t: f64, _ctx: &mut BlockContext<'_>) -> Result<()> {
        Ok(())
    }
}
