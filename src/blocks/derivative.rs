//! Backward-difference differentiator.

use crate::block::{Arity, Block, BlockContext, BlockIo};
use crate::error::{FlowError, Result};
use crate::signal::{SignalRegistry, Value};

use super::{expect_kind, float_output};

/// Approximates `dx/dt` from the input captured at the last accepted step.
///
/// Outputs `initial` until a step has been accepted, and repeats the last
/// accepted output while evaluated at that same time again.
#[derive(Debug, Clone)]
pub struct Derivative {
    /// Output at the last accepted step
    y: Value,
    /// Time and input of the last accepted step
    last: Option<(f64, Value)>,
}

impl Derivative {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self {
            y: initial.into(),
            last: None,
        }
    }
}

impl Default for Derivative {
    fn default() -> Self {
        Self::new(0.0)
    }
}

fn slope(x0: &Value, x1: &Value, dt: f64) -> Option<Value> {
    match (x0, x1) {
        (Value::Scalar(a), Value::Scalar(b)) => Some(Value::Scalar((b - a) / dt)),
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => Some(Value::Array((b - a) / dt)),
        _ => None,
    }
}

impl Block for Derivative {
    fn type_name(&self) -> &'static str {
        "derivative"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        let kind = float_output(io, signals)?;
        if self.y.kind() != kind {
            return Err(FlowError::invalid_block(
                io.name(),
                format!("initial value is {} but the output is {kind}", self.y.kind()),
            ));
        }
        expect_kind(signals, io.input(0)?, kind)
    }

    fn activation_function(&mut self, t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        let value = match &self.last {
            Some((t0, x0)) if *t0 != t => slope(x0, ctx.input(0)?, t - t0)
                .ok_or_else(|| FlowError::invalid_block(ctx.name(), "input is not a float value"))?,
            _ => self.y.clone(),
        };
        ctx.set_output(0, value)
    }

    fn post_step(&mut self, t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.y = ctx.output(0)?.clone();
        self.last = Some((t, ctx.input(0)?.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Model, Scheduler};
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn step(model: &mut Model, scheduler: &mut Scheduler, u: crate::signal::SignalId, t: f64, x: Value) {
        model.signals_mut().clear_all();
        model.signals_mut().set(u, x).unwrap();
        scheduler.process(model, t).unwrap();
    }

    #[test]
    fn test_backward_difference_of_a_ramp() {
        let mut model = Model::new("m");
        let root = model.root();
        let u = model.scalar(root, "u").unwrap();
        let y = model.scalar(root, "y").unwrap();
        model.add_block(root, "d", Derivative::new(-1.0), &[u], &[y]).unwrap();
        let mut scheduler = Scheduler::default();

        step(&mut model, &mut scheduler, u, 0.0, Value::Scalar(1.0));
        assert_eq!(model.signals().get_scalar(y).unwrap(), -1.0);
        model.post_step(0.0).unwrap();

        step(&mut model, &mut scheduler, u, 0.5, Value::Scalar(2.0));
        assert_relative_eq!(model.signals().get_scalar(y).unwrap(), 2.0);
        model.post_step(0.5).unwrap();

        // same time again repeats the accepted output
        step(&mut model, &mut scheduler, u, 0.5, Value::Scalar(7.0));
        assert_relative_eq!(model.signals().get_scalar(y).unwrap(), 2.0);
    }

    #[test]
    fn test_arrays_differentiate_elementwise() {
        let mut model = Model::new("m");
        let root = model.root();
        let u = model.array(root, "u", 2).unwrap();
        let y = model.array(root, "y", 2).unwrap();
        model
            .add_block(root, "d", Derivative::new(DVector::zeros(2)), &[u], &[y])
            .unwrap();
        let mut scheduler = Scheduler::default();

        step(&mut model, &mut scheduler, u, 0.0, Value::Array(DVector::from_vec(vec![0.0, 1.0])));
        model.post_step(0.0).unwrap();
        step(&mut model, &mut scheduler, u, 0.25, Value::Array(DVector::from_vec(vec![1.0, 0.0])));
        assert_eq!(
            model.signals().get_array(y).unwrap(),
            &DVector::from_vec(vec![4.0, -4.0])
        );
    }

    #[test]
    fn test_initial_kind_checked() {
        let mut model = Model::new("m");
        let root = model.root();
        let u = model.array(root, "u", 2).unwrap();
        let y = model.array(root, "y", 2).unwrap();
        assert!(model.add_block(root, "d", Derivative::default(), &[u], &[y]).is_err());
    }
}
