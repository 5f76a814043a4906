//! Signals: the named, typed value cells of the dataflow graph.
//!
//! Every signal lives in a [`SignalRegistry`] owned by the model and is
//! addressed by a stable [`SignalId`]. Blocks hold ids, never references,
//! so the block tree and the signal arena stay independent.
//!
//! ## Pass semantics
//!
//! A value slot is cleared at the start of every scheduling pass. Within a
//! pass it must be written exactly once before anyone reads it:
//!
//! - reading an unassigned slot fails with `UnassignedValue`
//! - writing an assigned slot fails with `Reassignment`
//!
//! A float signal may be linked to a second signal holding its time
//! derivative, which makes it a state variable driven by the stepper.

mod registry;
mod types;

pub use registry::SignalRegistry;
pub use types::{SignalId, SignalKind, Value};
