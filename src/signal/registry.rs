//! Signal storage with write-once-per-pass semantics.

use std::collections::HashMap;

use nalgebra::DVector;

use super::types::{SignalId, SignalKind, Value};
use crate::error::{FlowError, Result};

/// Link from a state variable to the signal holding its time derivative.
#[derive(Debug, Clone)]
struct StateLink {
    derivative: SignalId,
    /// Last value written to the state signal; survives clears.
    snapshot: Option<Value>,
}

/// One registered signal.
#[derive(Debug, Clone)]
struct Slot {
    name: String,
    kind: SignalKind,
    value: Option<Value>,
    assigned: bool,
    state: Option<StateLink>,
    derivative_of: Option<SignalId>,
    members: Vec<(String, SignalId)>,
}

impl Slot {
    fn new(name: String, kind: SignalKind) -> Self {
        Self {
            name,
            kind,
            value: None,
            assigned: false,
            state: None,
            derivative_of: None,
            members: Vec::new(),
        }
    }
}

/// Arena of every signal of a model, indexed by [`SignalId`].
///
/// Each value slot carries an `assigned` flag. A slot may be written once
/// between two clears and may only be read after it was written.
#[derive(Debug, Default, Clone)]
pub struct SignalRegistry {
    slots: Vec<Slot>,
    by_name: HashMap<String, SignalId>,
}

impl SignalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered signals (buses included).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no signal has been registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Register a value signal under a fully-qualified name.
    pub fn register(&mut self, name: impl Into<String>, kind: SignalKind) -> Result<SignalId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(FlowError::DuplicateSignal { name });
        }
        let id = SignalId(self.slots.len());
        self.by_name.insert(name.clone(), id);
        self.slots.push(Slot::new(name, kind));
        Ok(id)
    }

    /// Register a bus grouping existing signals under member labels.
    pub fn register_bus(&mut self, name: impl Into<String>, members: &[(&str, SignalId)]) -> Result<SignalId> {
        for (_, member) in members {
            self.slot(*member)?;
        }
        let id = self.register(name, SignalKind::Bus)?;
        self.slots[id.0].members = members
            .iter()
            .map(|(label, member)| (label.to_string(), *member))
            .collect();
        Ok(id)
    }

    /// Resolve a bus member by label.
    pub fn bus_member(&self, bus: SignalId, label: &str) -> Result<Option<SignalId>> {
        let slot = self.slot(bus)?;
        if slot.kind != SignalKind::Bus {
            return Err(FlowError::TypeMismatch {
                signal: slot.name.clone(),
                expected: SignalKind::Bus,
                found: slot.kind,
            });
        }
        Ok(slot
            .members
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, id)| *id))
    }

    /// Ordered members of a bus (empty for value signals).
    pub fn bus_members(&self, bus: SignalId) -> Result<&[(String, SignalId)]> {
        Ok(&self.slot(bus)?.members)
    }

    /// Find a signal by its fully-qualified name.
    pub fn find(&self, name: &str) -> Option<SignalId> {
        self.by_name.get(name).copied()
    }

    /// Fully-qualified name of a signal.
    pub fn name(&self, id: SignalId) -> Result<&str> {
        Ok(&self.slot(id)?.name)
    }

    /// Declared kind of a signal.
    pub fn kind(&self, id: SignalId) -> Result<SignalKind> {
        Ok(self.slot(id)?.kind)
    }

    /// Whether the signal was written since the last clear. Unknown ids are unassigned.
    pub fn is_assigned(&self, id: SignalId) -> bool {
        self.slots.get(id.0).map(|s| s.assigned).unwrap_or(false)
    }

    /// Read a value; fails unless it was written since the last clear.
    pub fn get(&self, id: SignalId) -> Result<&Value> {
        let slot = self.slot(id)?;
        if slot.kind == SignalKind::Bus {
            return Err(FlowError::NotAValue {
                signal: slot.name.clone(),
            });
        }
        match (&slot.value, slot.assigned) {
            (Some(value), true) => Ok(value),
            _ => Err(FlowError::UnassignedValue {
                signal: slot.name.clone(),
            }),
        }
    }

    pub fn get_scalar(&self, id: SignalId) -> Result<f64> {
        let value = self.get(id)?;
        value.as_scalar().ok_or_else(|| self.mismatch(id, SignalKind::Scalar, value.kind()))
    }

    pub fn get_array(&self, id: SignalId) -> Result<&DVector<f64>> {
        let value = self.get(id)?;
        match value {
            Value::Array(a) => Ok(a),
            other => Err(self.mismatch(id, SignalKind::Array(0), other.kind())),
        }
    }

    pub fn get_int(&self, id: SignalId) -> Result<i64> {
        let value = self.get(id)?;
        value.as_int().ok_or_else(|| self.mismatch(id, SignalKind::Int, value.kind()))
    }

    pub fn get_bool(&self, id: SignalId) -> Result<bool> {
        let value = self.get(id)?;
        value.as_bool().ok_or_else(|| self.mismatch(id, SignalKind::Bool, value.kind()))
    }

    /// Write a value; fails if the signal was already written in this pass.
    ///
    /// Writing a state variable also refreshes its snapshot slot.
    pub fn set(&mut self, id: SignalId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let slot = self.slots.get_mut(id.0).ok_or(FlowError::UnknownSignal { id: id.0 })?;
        if slot.kind == SignalKind::Bus {
            return Err(FlowError::NotAValue {
                signal: slot.name.clone(),
            });
        }
        if slot.assigned {
            return Err(FlowError::Reassignment {
                signal: slot.name.clone(),
            });
        }
        if value.kind() != slot.kind {
            return Err(FlowError::TypeMismatch {
                signal: slot.name.clone(),
                expected: slot.kind,
                found: value.kind(),
            });
        }
        if let Some(link) = slot.state.as_mut() {
            link.snapshot = Some(value.clone());
        }
        slot.value = Some(value);
        slot.assigned = true;
        Ok(())
    }

    /// Write a scalar value.
    pub fn set_scalar(&mut self, id: SignalId, value: f64) -> Result<()> {
        self.set(id, Value::Scalar(value))
    }

    /// Mark a single signal unassigned.
    pub fn clear(&mut self, id: SignalId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.assigned = false;
        }
    }

    /// Mark every signal unassigned.
    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            slot.assigned = false;
        }
    }

    /// Mark `state` as a state variable whose derivative is `derivative`.
    ///
    /// Both signals must be float signals of the same kind and size, and a
    /// derivative can back at most one state variable.
    pub fn link_state(&mut self, state: SignalId, derivative: SignalId) -> Result<()> {
        let s = self.slot(state)?;
        let d = self.slot(derivative)?;
        let fail = |message: &str| FlowError::state_link(&s.name, &d.name, message);

        if state == derivative {
            return Err(fail("a signal cannot be its own derivative"));
        }
        if !s.kind.is_float() || !d.kind.is_float() {
            return Err(fail("state variables must be scalar or array signals"));
        }
        if s.kind != d.kind {
            return Err(fail(&format!("kind mismatch ({} vs {})", s.kind, d.kind)));
        }
        if let Some(owner) = d.derivative_of {
            if owner != state {
                return Err(fail("derivative already backs another state variable"));
            }
        }
        if let Some(link) = &s.state {
            if link.derivative != derivative {
                return Err(fail("state variable is already linked to another derivative"));
            }
            return Ok(());
        }

        self.slots[state.0].state = Some(StateLink {
            derivative,
            snapshot: None,
        });
        self.slots[derivative.0].derivative_of = Some(state);
        Ok(())
    }

    /// Whether the signal is a state variable.
    pub fn is_state_variable(&self, id: SignalId) -> bool {
        self.slots.get(id.0).is_some_and(|s| s.state.is_some())
    }

    /// Derivative signal of a state variable.
    pub fn derivative_of(&self, state: SignalId) -> Option<SignalId> {
        self.slots.get(state.0)?.state.as_ref().map(|l| l.derivative)
    }

    /// Last value written to a state variable, assigned or not.
    pub fn state_snapshot(&self, state: SignalId) -> Option<&Value> {
        self.slots.get(state.0)?.state.as_ref()?.snapshot.as_ref()
    }

    /// Iterate over all signal ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = SignalId> {
        (0..self.slots.len()).map(SignalId)
    }

    fn slot(&self, id: SignalId) -> Result<&Slot> {
        self.slots.get(id.0).ok_or(FlowError::UnknownSignal { id: id.0 })
    }

    fn mismatch(&self, id: SignalId, expected: SignalKind, found: SignalKind) -> FlowError {
        FlowError::TypeMismatch {
            signal: self.slots[id.0].name.clone(),
            expected,
            found,
        }
    }
}
