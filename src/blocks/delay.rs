//! Variable transport delay with linear interpolation.

use std::collections::VecDeque;

use crate::block::{Arity, Block, BlockContext, BlockIo};
use crate::error::{FlowError, Result};
use crate::signal::{SignalKind, SignalRegistry, Value};

use super::{expect_kind, float_output};

/// Default retention window, in time units.
pub const DEFAULT_LIFESPAN: f64 = 10.0;

/// Outputs its input as it was `delay` time units ago.
///
/// Inputs are `[x, delay, initial]`. Samples of `x` are recorded at every
/// accepted step and kept for `lifespan` time units. For a lookup time
/// `t - delay`:
/// - at or before the oldest sample (or with no samples), output `initial`
/// - at or after the newest sample, output the newest sample
/// - otherwise interpolate linearly between neighbors
///
/// Only `delay` and `initial` gate scheduling, so a delay breaks feedback
/// loops the way a memory does.
#[derive(Debug, Clone)]
pub struct Delay {
    lifespan: f64,
    samples: VecDeque<(f64, Value)>,
}

impl Delay {
    pub fn new(lifespan: f64) -> Self {
        Self {
            lifespan,
            samples: VecDeque::new(),
        }
    }

    pub fn lifespan(&self) -> f64 {
        self.lifespan
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn lookup(&self, t: f64, initial: &Value) -> Option<Value> {
        let (Some((t_first, _)), Some((t_last, last))) = (self.samples.front(), self.samples.back()) else {
            return Some(initial.clone());
        };
        if t <= *t_first {
            return Some(initial.clone());
        }
        if t >= *t_last {
            return Some(last.clone());
        }

        // first sample at or after t; index 0 is excluded above
        let k = self.samples.partition_point(|(ts, _)| *ts < t);
        let (t0, x0) = &self.samples[k - 1];
        let (t1, x1) = &self.samples[k];
        Value::lerp(x0, x1, (t - t0) / (t1 - t0))
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new(DEFAULT_LIFESPAN)
    }
}

impl Block for Delay {
    fn type_name(&self) -> &'static str {
        "delay"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(3)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        if !(self.lifespan > 0.0) {
            return Err(FlowError::invalid_block(io.name(), "lifespan must be positive"));
        }
        let kind = float_output(io, signals)?;
        let (x, delay, initial) = (io.input(0)?, io.input(1)?, io.input(2)?);
        expect_kind(signals, x, kind)?;
        expect_kind(signals, delay, SignalKind::Scalar)?;
        expect_kind(signals, initial, kind)?;
        io.set_dependencies(vec![delay, initial]);
        Ok(())
    }

    fn activation_function(&mut self, t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        let delay = ctx.scalar_input(1)?;
        let initial = ctx.input(2)?;
        let value = self
            .lookup(t - delay, initial)
            .ok_or_else(|| FlowError::invalid_block(ctx.name(), "history holds mismatched values"))?;
        ctx.set_output(0, value)
    }

    fn post_step(&mut self, t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        let horizon = t - self.lifespan;
        while self.samples.front().is_some_and(|(ts, _)| *ts < horizon) {
            self.samples.pop_front();
        }

        let x = ctx.input(0)?.clone();
        // a repeated step replaces its sample
        if self.samples.back().is_some_and(|(ts, _)| *ts >= t) {
            self.samples.pop_back();
        }
        self.samples.push_back((t, x));
        Ok(())
    }
}
