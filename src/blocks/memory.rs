//! Unit delay by one accepted step.

use crate::block::{Arity, Block, BlockContext, BlockIo};
use crate::error::{FlowError, Result};
use crate::signal::{SignalRegistry, Value};

use super::expect_kind;

/// Outputs the input captured at the previous accepted step.
///
/// The input is not a scheduling dependency, so a memory can close a
/// feedback loop. Works with every value kind.
#[derive(Debug, Clone)]
pub struct Memory {
    value: Value,
}

impl Memory {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self {
            value: initial.into(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Block for Memory {
    fn type_name(&self) -> &'static str {
        "memory"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        let kind = signals.kind(io.output(0)?)?;
        if self.value.kind() != kind {
            return Err(FlowError::invalid_block(
                io.name(),
                format!("initial value is {} but the output is {kind}", self.value.kind()),
            ));
        }
        expect_kind(signals, io.input(0)?, kind)?;
        io.set_dependencies(Vec::new());
        Ok(())
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        ctx.set_output(0, self.value.clone())
    }

    fn post_step(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.value = ctx.input(0)?.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Model, Scheduler};

    #[test]
    fn test_output_lags_input_by_one_step() {
        let mut model = Model::new("m");
        let root = model.root();
        let u = model.int(root, "u").unwrap();
        let y = model.int(root, "y").unwrap();
        model.add_block(root, "mem", Memory::new(-1_i64), &[u], &[y]).unwrap();
        let mut scheduler = Scheduler::default();

        let mut seen = Vec::new();
        for k in 0..4_i64 {
            model.signals_mut().clear_all();
            model.signals_mut().set(u, 10 * k).unwrap();
            scheduler.process(&mut model, k as f64).unwrap();
            seen.push(model.signals().get_int(y).unwrap());
            model.post_step(k as f64).unwrap();
        }
        assert_eq!(seen, vec![-1, 0, 10, 20]);
    }

    #[test]
    fn test_runs_before_its_input_is_known() {
        let mut model = Model::new("m");
        let root = model.root();
        let u = model.scalar(root, "u").unwrap();
        let y = model.scalar(root, "y").unwrap();
        let id = model.add_block(root, "mem", Memory::new(0.0), &[u], &[y]).unwrap();
        assert!(model.io(id).unwrap().dependencies().is_empty());
    }

    #[test]
    fn test_initial_kind_checked() {
        let mut model = Model::new("m");
        let root = model.root();
        let u = model.scalar(root, "u").unwrap();
        let y = model.scalar(root, "y").unwrap();
        assert!(model.add_block(root, "mem", Memory::new(true), &[u], &[y]).is_err());
    }
}
