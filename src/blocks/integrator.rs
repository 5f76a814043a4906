//! Integrators: blocks whose output is a state variable.
//!
//! The output is linked to the input as its derivative. The value itself
//! comes from the stepper, so the block runs as soon as the output has
//! been primed for the pass and computes nothing.

use crate::block::{Arity, Block, BlockContext, BlockIo};
use crate::error::{FlowError, Result};
use crate::signal::{SignalKind, SignalRegistry, Value};

use super::{expect_kind, float_output};

/// Validate kinds, link the state variable, and depend on the output only.
fn connect_state(io: &mut BlockIo, signals: &mut SignalRegistry, initial: &Value) -> Result<SignalKind> {
    let kind = float_output(io, signals)?;
    let out = io.output(0)?;
    let derivative = io.input(0)?;
    expect_kind(signals, derivative, kind)?;
    if initial.kind() != kind {
        return Err(FlowError::invalid_block(
            io.name(),
            format!("initial value is {} but the output is {kind}", initial.kind()),
        ));
    }
    signals.link_state(out, derivative)?;
    Ok(kind)
}

/// Continuous integrator `x' = u`.
#[derive(Debug, Clone)]
pub struct Integrator {
    value: Value,
}

impl Integrator {
    /// Integrator starting from `initial` (scalar or array).
    pub fn new(initial: impl Into<Value>) -> Self {
        Self {
            value: initial.into(),
        }
    }

    /// State captured at the end of the last accepted step.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Default for Integrator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Block for Integrator {
    fn type_name(&self) -> &'static str {
        "integrator"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        connect_state(io, signals, &self.value)?;
        let out = io.output(0)?;
        io.set_dependencies(vec![out]);
        Ok(())
    }

    fn activation_function(&mut self, _t: f64, _ctx: &mut BlockContext<'_>) -> Result<()> {
        Ok(())
    }

    fn pre_step(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        ctx.set_output(0, self.value.clone())
    }

    fn post_step(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.value = ctx.output(0)?.clone();
        Ok(())
    }
}

/// Integrator with a reset trigger.
///
/// Inputs are `[derivative, trigger]`. Once the boolean trigger is seen
/// true during a pass, the state restarts from zero at the next step.
#[derive(Debug, Clone)]
pub struct TriggeredIntegrator {
    value: Value,
    kind: SignalKind,
    triggered: bool,
}

impl TriggeredIntegrator {
    pub fn new(initial: impl Into<Value>) -> Self {
        let value = initial.into();
        Self {
            kind: value.kind(),
            value,
            triggered: false,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Default for TriggeredIntegrator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Block for TriggeredIntegrator {
    fn type_name(&self) -> &'static str {
        "triggered_integrator"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(2)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        self.kind = connect_state(io, signals, &self.value)?;
        let trigger = io.input(1)?;
        expect_kind(signals, trigger, SignalKind::Bool)?;
        let out = io.output(0)?;
        io.set_dependencies(vec![trigger, out]);
        Ok(())
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        if !self.triggered {
            self.triggered = ctx.bool_input(1)?;
        }
        Ok(())
    }

    fn pre_step(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        if self.triggered {
            if let Some(zero) = self.kind.zero() {
                self.value = zero;
            }
            self.triggered = false;
        }
        ctx.set_output(0, self.value.clone())
    }

    fn post_step(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.value = ctx.output(0)?.clone();
        Ok(())
    }
}
