//! Flat state and derivative vectors over the model's state variables.

use std::collections::HashSet;

use nalgebra::DVector;

use crate::block::Model;
use crate::error::{FlowError, Result};
use crate::signal::{SignalId, SignalKind, SignalRegistry, Value};

#[derive(Debug, Clone, Copy)]
struct StateEntry {
    state: SignalId,
    derivative: SignalId,
    kind: SignalKind,
    offset: usize,
}

impl StateEntry {
    fn len(&self) -> usize {
        self.kind.float_len()
    }
}

/// Packing of every state variable into one contiguous `f64` vector.
///
/// The element order is fixed at discovery and is shared by the state
/// vector and the derivative vector.
#[derive(Debug, Clone, Default)]
pub struct StateVector {
    entries: Vec<StateEntry>,
    len: usize,
}

impl StateVector {
    /// Collect every state variable bound to some leaf, in leaf order and
    /// then port order (inputs before outputs).
    pub fn discover(model: &Model) -> Result<Self> {
        let signals = model.signals();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut len = 0;

        for id in model.leaves() {
            let Some(io) = model.io(*id) else {
                continue;
            };
            for sig in io.inputs().iter().chain(io.outputs()) {
                let Some(derivative) = signals.derivative_of(*sig) else {
                    continue;
                };
                if !seen.insert(*sig) {
                    continue;
                }
                let kind = signals.kind(*sig)?;
                entries.push(StateEntry {
                    state: *sig,
                    derivative,
                    kind,
                    offset: len,
                });
                len += kind.float_len();
            }
        }

        Ok(Self { entries, len })
    }

    /// Number of `f64` elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// State variable signals in packing order.
    pub fn states(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.entries.iter().map(|e| e.state)
    }

    /// Unassign every signal.
    pub fn clear(&self, signals: &mut SignalRegistry) {
        signals.clear_all();
    }

    /// Unassign every signal, then write each state variable from `v`.
    pub fn reset_with_state_variables(&self, signals: &mut SignalRegistry, v: &DVector<f64>) -> Result<()> {
        self.check_len(v)?;
        signals.clear_all();
        for e in &self.entries {
            let value = match e.kind {
                SignalKind::Scalar => Value::Scalar(v[e.offset]),
                _ => Value::Array(v.rows(e.offset, e.len()).into_owned()),
            };
            signals.set(e.state, value)?;
        }
        Ok(())
    }

    /// Read the state variables into `v`.
    ///
    /// A state variable not written in the current pass contributes its
    /// last written value.
    pub fn get_state_variables(&self, signals: &SignalRegistry, v: &mut DVector<f64>) -> Result<()> {
        self.resize(v);
        for e in &self.entries {
            let value = if signals.is_assigned(e.state) {
                signals.get(e.state)?
            } else {
                signals.state_snapshot(e.state).ok_or_else(|| FlowError::UnassignedValue {
                    signal: signals.name(e.state).map(str::to_string).unwrap_or_default(),
                })?
            };
            write_slice(v, e, value);
        }
        Ok(())
    }

    /// Read the derivative signals into `dv`; all must be assigned.
    pub fn get_derivatives(&self, signals: &SignalRegistry, dv: &mut DVector<f64>) -> Result<()> {
        self.resize(dv);
        for e in &self.entries {
            write_slice(dv, e, signals.get(e.derivative)?);
        }
        Ok(())
    }

    fn resize(&self, v: &mut DVector<f64>) {
        if v.len() != self.len {
            *v = DVector::zeros(self.len);
        }
    }

    fn check_len(&self, v: &DVector<f64>) -> Result<()> {
        if v.len() != self.len {
            return Err(FlowError::invalid_config(format!(
                "state vector has {} elements, expected {}",
                v.len(),
                self.len
            )));
        }
        Ok(())
    }
}

fn write_slice(v: &mut DVector<f64>, e: &StateEntry, value: &Value) {
    match value {
        Value::Scalar(x) => v[e.offset] = *x,
        Value::Array(a) => v.rows_mut(e.offset, e.len()).copy_from(a),
        // state links only accept float signals
        Value::Int(_) | Value::Bool(_) => {}
    }
}
