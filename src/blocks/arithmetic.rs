//! Arithmetic blocks: sums, products and gains.

use nalgebra::DVector;

use crate::block::{Arity, Block, BlockContext, BlockIo};
use crate::error::{FlowError, Result};
use crate::signal::{SignalKind, SignalRegistry, Value};

use super::{expect_kind, float_output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn apply(self, acc: f64, x: f64) -> f64 {
        match self {
            Op::Add => acc + x,
            Op::Sub => acc - x,
            Op::Mul => acc * x,
            Op::Div => acc / x,
        }
    }
}

/// Shared machinery of the combiners: one operator per input, folded
/// left to right over an initial accumulator.
#[derive(Debug, Clone)]
struct Combiner {
    ops: Vec<Op>,
    /// Operator repeated over however many inputs get connected
    repeat: Option<Op>,
    initial: f64,
    kind: SignalKind,
}

impl Combiner {
    fn parse(block: &str, ops: &str, initial: f64, allowed: [(char, Op); 2]) -> Result<Self> {
        let parsed = ops
            .chars()
            .map(|c| {
                allowed
                    .iter()
                    .find(|(symbol, _)| *symbol == c)
                    .map(|(_, op)| *op)
                    .ok_or_else(|| {
                        FlowError::invalid_block(
                            block,
                            format!("unknown operator '{c}', expected '{}' or '{}'", allowed[0].0, allowed[1].0),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        if parsed.is_empty() {
            return Err(FlowError::invalid_block(block, "at least one operator is required"));
        }
        Ok(Self {
            ops: parsed,
            repeat: None,
            initial,
            kind: SignalKind::Scalar,
        })
    }

    fn repeated(op: Op, initial: f64) -> Self {
        Self {
            ops: Vec::new(),
            repeat: Some(op),
            initial,
            kind: SignalKind::Scalar,
        }
    }

    fn num_inputs(&self) -> Arity {
        match self.repeat {
            Some(_) => Arity::Unlimited,
            None => Arity::Exactly(self.ops.len()),
        }
    }

    fn connect(&mut self, io: &BlockIo, signals: &SignalRegistry) -> Result<()> {
        if let Some(op) = self.repeat {
            if io.inputs().is_empty() {
                return Err(FlowError::invalid_block(io.name(), "at least one input is required"));
            }
            self.ops = vec![op; io.inputs().len()];
        }
        self.kind = float_output(io, signals)?;
        for sig in io.inputs() {
            expect_kind(signals, *sig, self.kind)?;
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
        let value = match self.kind {
            SignalKind::Array(n) => {
                let mut acc = DVector::from_element(n, self.initial);
                for (i, op) in self.ops.iter().enumerate() {
                    let x = ctx.input(i)?;
                    let x = x.as_array().ok_or_else(|| {
                        FlowError::invalid_block(ctx.name(), format!("input {i} is not an array"))
                    })?;
                    acc.zip_apply(x, |a, b| *a = op.apply(*a, b));
                }
                Value::Array(acc)
            }
            _ => {
                let mut acc = self.initial;
                for (i, op) in self.ops.iter().enumerate() {
                    acc = op.apply(acc, ctx.scalar_input(i)?);
                }
                Value::Scalar(acc)
            }
        };
        ctx.set_output(0, value)
    }
}

/// Signed sum, e.g. `AddSub::new("+-+")` computes `x0 - x1 + x2`.
///
/// Inputs and output share one kind; array inputs combine element-wise.
#[derive(Debug, Clone)]
pub struct AddSub {
    inner: Combiner,
}

impl AddSub {
    /// Build from an operator string of `+` and `-`, one per input.
    pub fn new(ops: &str) -> Result<Self> {
        Self::with_initial(ops, 0.0)
    }

    pub fn with_initial(ops: &str, initial: f64) -> Result<Self> {
        Ok(Self {
            inner: Combiner::parse("addsub", ops, initial, [('+', Op::Add), ('-', Op::Sub)])?,
        })
    }
}

impl Block for AddSub {
    fn type_name(&self) -> &'static str {
        "addsub"
    }

    fn num_inputs(&self) -> Arity {
        self.inner.num_inputs()
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        self.inner.connect(io, signals)
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.inner.evaluate(ctx)
    }
}

/// Product and quotient, e.g. `MulDiv::new("**/")` computes `x0 * x1 / x2`.
#[derive(Debug, Clone)]
pub struct MulDiv {
    inner: Combiner,
}

impl MulDiv {
    /// Build from an operator string of `*` and `/`, one per input.
    pub fn new(ops: &str) -> Result<Self> {
        Self::with_initial(ops, 1.0)
    }

    pub fn with_initial(ops: &str, initial: f64) -> Result<Self> {
        Ok(Self {
            inner: Combiner::parse("muldiv", ops, initial, [('*', Op::Mul), ('/', Op::Div)])?,
        })
    }
}

impl Block for MulDiv {
    fn type_name(&self) -> &'static str {
        "muldiv"
    }

    fn num_inputs(&self) -> Arity {
        self.inner.num_inputs()
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        self.inner.connect(io, signals)
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.inner.evaluate(ctx)
    }
}

/// Sum of any number of inputs, `y = initial + x0 + x1 + ...`.
///
/// One `+` is used per input connected.
#[derive(Debug, Clone)]
pub struct Add {
    inner: Combiner,
}

impl Add {
    pub fn new(initial: f64) -> Self {
        Self {
            inner: Combiner::repeated(Op::Add, initial),
        }
    }
}

impl Default for Add {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Block for Add {
    fn type_name(&self) -> &'static str {
        "add"
    }

    fn num_inputs(&self) -> Arity {
        self.inner.num_inputs()
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        self.inner.connect(io, signals)
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.inner.evaluate(ctx)
    }
}

/// Product of any number of inputs, `y = initial * x0 * x1 * ...`.
#[derive(Debug, Clone)]
pub struct Multiply {
    inner: Combiner,
}

impl Multiply {
    pub fn new(initial: f64) -> Self {
        Self {
            inner: Combiner::repeated(Op::Mul, initial),
        }
    }
}

impl Default for Multiply {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Block for Multiply {
    fn type_name(&self) -> &'static str {
        "multiply"
    }

    fn num_inputs(&self) -> Arity {
        self.inner.num_inputs()
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        self.inner.connect(io, signals)
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        self.inner.evaluate(ctx)
    }
}

/// Constant factor `y = k * x` for scalar or array signals.
#[derive(Debug, Clone)]
pub struct Gain {
    k: f64,
}

impl Gain {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn factor(&self) -> f64 {
        self.k
    }
}

impl Block for Gain {
    fn type_name(&self) -> &'static str {
        "gain"
    }

    fn num_inputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn num_outputs(&self) -> Arity {
        Arity::Exactly(1)
    }

    fn connect(&mut self, io: &mut BlockIo, signals: &mut SignalRegistry) -> Result<()> {
        let kind = float_output(io, signals)?;
        expect_kind(signals, io.input(0)?, kind)
    }

    fn activation_function(&mut self, _t: f64, ctx: &mut BlockContext<'_>) -> Result<()> {
        let scaled = ctx
            .input(0)?
            .scaled(self.k)
            .ok_or_else(|| FlowError::invalid_block(ctx.name(), "input is not a float value"))?;
        ctx.set_output(0, scaled)
    }
}
