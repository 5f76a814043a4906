//! Model validation.

use std::collections::HashMap;

use crate::error::{FlowError, Result};
use crate::signal::SignalId;

use super::Model;

/// Validate a model before simulation.
///
/// Checks:
/// - Every leaf block has been connected
/// - No signal is an output of two blocks
/// - No block writes a bus
pub fn validate_model(model: &Model) -> Result<()> {
    let mut drivers: HashMap<SignalId, &str> = HashMap::new();

    for id in model.leaves() {
        let name = model.full_name(*id)?;
        let io = model.io(*id).ok_or_else(|| FlowError::NotConnected {
            block: name.to_string(),
        })?;

        for sig in io.outputs() {
            if !model.signals().kind(*sig)?.is_value() {
                return Err(FlowError::invalid_block(
                    name,
                    format!("output {} is a bus", model.signals().name(*sig)?),
                ));
            }
            if let Some(other) = drivers.insert(*sig, name) {
                return Err(FlowError::invalid_block(
                    name,
                    format!(
                        "output {} is already driven by {other}",
                        model.signals().name(*sig)?
                    ),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Const, Gain};

    #[test]
    fn test_unconnected_leaf_is_reported() {
        let mut model = Model::new("m");
        let root = model.root();
        model.insert(root, "lonely", Const::new(1.0)).unwrap();
        let err = validate_model(&model).unwrap_err();
        assert!(matches!(err, FlowError::NotConnected { ref block } if block == "/m/lonely"));
    }

    #[test]
    fn test_double_driver_is_reported() {
        let mut model = Model::new("m");
        let root = model.root();
        let x = model.scalar(root, "x").unwrap();
        let y = model.scalar(root, "y").unwrap();
        model.add_block(root, "a", Const::new(1.0), &[], &[x]).unwrap();
        model.add_block(root, "b", Gain::new(2.0), &[x], &[x]).unwrap();
        model.add_block(root, "c", Gain::new(2.0), &[x], &[y]).unwrap();

        let err = validate_model(&model).unwrap_err();
        assert!(err.to_string().contains("already driven by /m/a"));
    }

    #[test]
    fn test_well_formed_model_passes() {
        let mut model = Model::new("m");
        let root = model.root();
        let x = model.scalar(root, "x").unwrap();
        let y = model.scalar(root, "y").unwrap();
        model.add_block(root, "a", Const::new(1.0), &[], &[x]).unwrap();
        model.add_block(root, "b", Gain::new(2.0), &[x], &[y]).unwrap();
        assert!(validate_model(&model).is_ok());
    }
}
