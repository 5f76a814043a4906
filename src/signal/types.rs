//! Core types for signal representation.

use std::fmt;

use nalgebra::DVector;

/// A unique identifier for a signal, assigned once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub usize);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// The type of value a signal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// A single `f64`
    Scalar,
    /// A fixed-size `f64` array
    Array(usize),
    /// A signed integer
    Int,
    /// A boolean flag
    Bool,
    /// A named, ordered group of other signals (carries no value)
    Bus,
}

impl SignalKind {
    /// Whether this kind can be integrated as a state variable.
    pub fn is_float(&self) -> bool {
        matches!(self, SignalKind::Scalar | SignalKind::Array(_))
    }

    /// Whether signals of this kind hold a value (everything but buses).
    pub fn is_value(&self) -> bool {
        !matches!(self, SignalKind::Bus)
    }

    /// Number of `f64` elements a state variable of this kind occupies.
    pub fn float_len(&self) -> usize {
        match self {
            SignalKind::Scalar => 1,
            SignalKind::Array(n) => *n,
            _ => 0,
        }
    }

    /// The zero value for value-carrying kinds.
    pub fn zero(&self) -> Option<Value> {
        match self {
            SignalKind::Scalar => Some(Value::Scalar(0.0)),
            SignalKind::Array(n) => Some(Value::Array(DVector::zeros(*n))),
            SignalKind::Int => Some(Value::Int(0)),
            SignalKind::Bool => Some(Value::Bool(false)),
            SignalKind::Bus => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Scalar => write!(f, "scalar"),
            SignalKind::Array(n) => write!(f, "array[{n}]"),
            SignalKind::Int => write!(f, "int"),
            SignalKind::Bool => write!(f, "bool"),
            SignalKind::Bus => write!(f, "bus"),
        }
    }
}

/// A value held by a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Array(DVector<f64>),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// The signal kind matching this value.
    pub fn kind(&self) -> SignalKind {
        match self {
            Value::Scalar(_) => SignalKind::Scalar,
            Value::Array(a) => SignalKind::Array(a.len()),
            Value::Int(_) => SignalKind::Int,
            Value::Bool(_) => SignalKind::Bool,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&DVector<f64>> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Flattened `f64` view used by the state vector and history export.
    ///
    /// Integers and booleans are widened; `true` maps to 1.0.
    pub fn to_f64s(&self) -> Vec<f64> {
        match self {
            Value::Scalar(v) => vec![*v],
            Value::Array(a) => a.iter().copied().collect(),
            Value::Int(v) => vec![*v as f64],
            Value::Bool(v) => vec![if *v { 1.0 } else { 0.0 }],
        }
    }

    /// Linear blend `a + (b - a) * w` of two float values of the same kind.
    ///
    /// Returns `None` for non-float values or mismatched kinds.
    pub fn lerp(a: &Value, b: &Value, w: f64) -> Option<Value> {
        match (a, b) {
            (Value::Scalar(a), Value::Scalar(b)) => Some(Value::Scalar(a + (b - a) * w)),
            (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
                Some(Value::Array(a + (b - a) * w))
            }
            _ => None,
        }
    }

    /// Multiply a float value by a scalar factor.
    pub fn scaled(&self, k: f64) -> Option<Value> {
        match self {
            Value::Scalar(v) => Some(Value::Scalar(k * v)),
            Value::Array(a) => Some(Value::Array(a * k)),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<DVector<f64>> for Value {
    fn from(v: DVector<f64>) -> Self {
        Value::Array(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
