//! Leaf block library.
//!
//! This module provides the stock blocks:
//! - State: Integrator, TriggeredIntegrator
//! - Loop breakers: Memory, Delay
//! - Arithmetic: AddSub, MulDiv, Add, Multiply, Gain
//! - Differentiation: Derivative
//! - Sources: Const, Source, Function
//!
//! Any other type implementing [`Block`](crate::block::Block) can be
//! inserted into a model alongside these.

mod arithmetic;
mod delay;
mod derivative;
mod integrator;
mod memory;
mod sources;

pub use arithmetic::{Add, AddSub, Gain, MulDiv, Multiply};
pub use delay::{Delay, DEFAULT_LIFESPAN};
pub use derivative::Derivative;
pub use integrator::{Integrator, TriggeredIntegrator};
pub use memory::Memory;
pub use sources::{Const, Function, Source};

use crate::block::BlockIo;
use crate::error::{FlowError, Result};
use crate::signal::{SignalId, SignalKind, SignalRegistry};

/// Fail with `TypeMismatch` unless `signal` has kind `expected`.
fn expect_kind(signals: &SignalRegistry, signal: SignalId, expected: SignalKind) -> Result<()> {
    let found = signals.kind(signal)?;
    if found != expected {
        return Err(FlowError::TypeMismatch {
            signal: signals.name(signal)?.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Kind of the single output, which must be a float signal.
fn float_output(io: &BlockIo, signals: &SignalRegistry) -> Result<SignalKind> {
    let kind = signals.kind(io.output(0)?)?;
    if !kind.is_float() {
        return Err(FlowError::invalid_block(
            io.name(),
            format!("output must be a scalar or array signal, got {kind}"),
        ));
    }
    Ok(kind)
}
