//! Forward Euler stepper.

use nalgebra::DVector;

use super::stepper::{combine, fit, DerivativeFn, Stepper};
use crate::error::Result;

/// Explicit forward Euler, `v1 = v0 + h * f(t0, v0)`.
///
/// First order, one derivative evaluation per step, fixed step size.
#[derive(Debug, Clone)]
pub struct Euler {
    k1: DVector<f64>,
}

impl Euler {
    pub fn new() -> Self {
        Self {
            k1: DVector::zeros(0),
        }
    }
}

impl Default for Euler {
    fn default() -> Self {
        Self::new()
    }
}

impl Stepper for Euler {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn step(
        &mut self,
        f: &mut DerivativeFn<'_>,
        t0: f64,
        v0: &DVector<f64>,
        t1: f64,
        v1: &mut DVector<f64>,
    ) -> Result<f64> {
        let h = t1 - t0;
        fit(&mut self.k1, v0.len());
        f(t0, v0, &mut self.k1)?;
        combine(v1, v0, h, &[(1.0, &self.k1)]);
        Ok(h)
    }
}
