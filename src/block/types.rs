//! Core types for block representation.

use std::fmt;

use crate::error::{FlowError, PortDirection, Result};
use crate::signal::{SignalId, SignalRegistry, Value};

/// A unique identifier for a block (leaf or parent) in a model.
/// Block 0 is always the model itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl BlockId {
    /// The root of every model.
    pub const ROOT: BlockId = BlockId(0);

    pub fn is_root(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Number of signals a block accepts on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    /// Variadic, e.g. add or multiply blocks
    Unlimited,
}

impl Arity {
    /// Check a port count against this arity.
    pub fn check(&self, block: &str, direction: PortDirection, actual: usize) -> Result<()> {
        match self {
            Arity::Exactly(expected) if *expected != actual => {
                Err(FlowError::arity(block, direction, *expected, actual))
            }
            _ => Ok(()),
        }
    }
}

/// The signals a connected block is bound to.
///
/// `dependencies` starts out as the de-duplicated input list; a block may
/// replace it in [`Block::connect`](super::Block::connect) when its
/// readiness does not follow its inputs (memories, delays, integrators).
#[derive(Debug, Clone)]
pub struct BlockIo {
    name: String,
    inputs: Vec<SignalId>,
    outputs: Vec<SignalId>,
    dependencies: Vec<SignalId>,
}

impl BlockIo {
    pub(crate) fn new(name: String, inputs: &[SignalId], outputs: &[SignalId]) -> Self {
        let mut dependencies: Vec<SignalId> = Vec::with_capacity(inputs.len());
        for sig in inputs {
            if !dependencies.contains(sig) {
                dependencies.push(*sig);
            }
        }
        Self {
            name,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            dependencies,
        }
    }

    /// Full hierarchical name of the owning block.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[SignalId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SignalId] {
        &self.outputs
    }

    /// Signals that must be assigned before the block may run.
    pub fn dependencies(&self) -> &[SignalId] {
        &self.dependencies
    }

    pub fn set_dependencies(&mut self, dependencies: Vec<SignalId>) {
        self.dependencies = dependencies;
    }

    pub fn input(&self, index: usize) -> Result<SignalId> {
        self.inputs
            .get(index)
            .copied()
            .ok_or_else(|| FlowError::invalid_block(&self.name, format!("no input port {index}")))
    }

    pub fn output(&self, index: usize) -> Result<SignalId> {
        self.outputs
            .get(index)
            .copied()
            .ok_or_else(|| FlowError::invalid_block(&self.name, format!("no output port {index}")))
    }
}

/// What a block sees while it runs: read access to its inputs and
/// write-once access to its own outputs, addressed by port index.
pub struct BlockContext<'a> {
    io: &'a BlockIo,
    signals: &'a mut SignalRegistry,
}

impl<'a> BlockContext<'a> {
    pub fn new(io: &'a BlockIo, signals: &'a mut SignalRegistry) -> Self {
        Self { io, signals }
    }

    pub fn name(&self) -> &str {
        self.io.name()
    }

    pub fn num_inputs(&self) -> usize {
        self.io.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.io.outputs.len()
    }

    pub fn input_assigned(&self, index: usize) -> bool {
        self.io
            .inputs
            .get(index)
            .is_some_and(|id| self.signals.is_assigned(*id))
    }

    pub fn input(&self, index: usize) -> Result<&Value> {
        self.signals.get(self.io.input(index)?)
    }

    pub fn scalar_input(&self, index: usize) -> Result<f64> {
        self.signals.get_scalar(self.io.input(index)?)
    }

    pub fn bool_input(&self, index: usize) -> Result<bool> {
        self.signals.get_bool(self.io.input(index)?)
    }

    pub fn output_assigned(&self, index: usize) -> bool {
        self.io
            .outputs
            .get(index)
            .is_some_and(|id| self.signals.is_assigned(*id))
    }

    /// Read back an output this block (or the state priming) already wrote.
    pub fn output(&self, index: usize) -> Result<&Value> {
        self.signals.get(self.io.output(index)?)
    }

    pub fn set_output(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let id = self.io.output(index)?;
        self.signals.set(id, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalKind;

    #[test]
    fn test_dependencies_are_deduplicated() {
        let io = BlockIo::new(
            "/m/add".to_string(),
            &[SignalId(1), SignalId(2), SignalId(1)],
            &[SignalId(3)],
        );
        assert_eq!(io.inputs().len(), 3);
        assert_eq!(io.dependencies(), &[SignalId(1), SignalId(2)]);
    }

    #[test]
    fn test_arity_check() {
        assert!(Arity::Exactly(2).check("b", PortDirection::Input, 2).is_ok());
        assert!(Arity::Unlimited.check("b", PortDirection::Output, 7).is_ok());
        let err = Arity::Exactly(1).check("b", PortDirection::Output, 0).unwrap_err();
        assert!(matches!(
            err,
            FlowError::ArityMismatch { expected: 1, actual: 0, .. }
        ));
    }

    #[test]
    fn test_context_writes_only_own_outputs() {
        let mut reg = SignalRegistry::new();
        let x = reg.register("/m~x", SignalKind::Scalar).unwrap();
        let y = reg.register("/m~y", SignalKind::Scalar).unwrap();
        reg.set_scalar(x, 2.0).unwrap();
        let io = BlockIo::new("/m/gain".to_string(), &[x], &[y]);

        let mut ctx = BlockContext::new(&io, &mut reg);
        assert!(ctx.input_assigned(0));
        assert!(!ctx.output_assigned(0));
        let v = ctx.scalar_input(0).unwrap();
        ctx.set_output(0, 3.0 * v).unwrap();
        assert!(ctx.set_output(1, 0.0).is_err());
        assert_eq!(reg.get_scalar(y).unwrap(), 6.0);
    }
}
