//! Blocks computing their output from time alone or from a closure.

use std::fmt;

use crate::block::{Arity, Block, BlockContext, BlockIo};
use crate::error::{FlowError, Result};
use crate::signal::{SignalKind, SignalRegistry, Value};

use super::expect_kind;

/// Constant output of any value kind.
#[derive(Debug, Clone)]
pub struct Const {
    value: Value,
}

impl Const {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Block for Const {
    fn type_name(&self) -> &'static str {
        "const"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(0)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        expect_kind(signals, io.output(0)?, self.value.kind())
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        ctx.set_output(0, self.value.clone())
    }
}

type TimeFn = Box<dyn FnMut(f64) -> Value>;

/// Output computed from time, `y = f(t)`.
pub struct Source {
    f: TimeFn,
}

impl Source {
    /// Scalar source.
    pub fn new(mut f: impl FnMut(f64) -> f64 + 'static) -> Self {
        Self {
            f: Box::new(move |t| Value::Scalar(f(t))),
        }
    }

    /// Source producing values of any kind; the kind must match the
    /// output signal on every call.
    pub fn value(f: impl FnMut(f64) -> Value + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source").finish_non_exhaustive()
    }
}

impl Block for Source {
    fn type_name(&self) -> &'static str {
        "source"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(0)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn activation_function(&mut self, t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        let value = (self.f)(t);
        ctx.set_output(0, value)
    }
}

type ScalarFn = Box<dyn FnMut(f64, f64) -> f64>;

/// Scalar function of time and one input, `y = f(t, x)`.
pub struct Function {
    f: ScalarFn,
}

impl Function {
    pub fn new(f: impl FnMut(f64, f64) -> f64 + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").finish_non_exhaustive()
    }
}

impl Block for Function {
    fn type_name(&self) -> &'static str {
        "function"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        expect_kind(signals, io.input(0)?, SignalKind::Scalar)?;
        expect_kind(signals, io.output(0)?, SignalKind::Scalar)
    }

    fn activation_function(&mut self, t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        let x = ctx.scalar_input(0)?;
        let y = (self.f)(t, x);
        if y.is_nan() && !x.is_nan() {
            return Err(FlowError::invalid_block(
                ctx.name(),
                format!("function returned NaN for t = {t}, x = {x}"),
            ));
        }
        ctx.set_output(0, y)
    }
}
