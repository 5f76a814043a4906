//! Stepper trait shared by the explicit integrators.

use nalgebra::DVector;

use crate::error::Result;

/// Derivative callback `f(t, x, dx)`: writes `dx/dt` at `(t, x)` into `dx`.
///
/// `dx` always has the length of `x`.
pub type DerivativeFn<'a> = dyn FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()> + 'a;

/// Advances a flat state vector across one interval.
pub trait Stepper {
    /// Short lowercase name, e.g. `rk4`.
    fn name(&self) -> &'static str;

    /// Whether `step` can suggest a step size other than the one tried.
    fn is_adaptive(&self) -> bool {
        false
    }

    /// Integrate from `(t0, v0)` to `t1`, writing the new state into `v1`.
    ///
    /// Returns the suggested size of the next attempt. Fixed-step methods
    /// return `t1 - t0`. `v0` is never modified; `v1` is resized to match.
    fn step(
        &mut self,
        f: &mut DerivativeFn<'_>,
        t0: f64,
        v0: &DVector<f64>,
        t1: f64,
        v1: &mut DVector<f64>,
    ) -> Result<f64>;
}

/// Resize a scratch buffer to `n` elements, reallocating only on change.
pub(crate) fn fit(buf: &mut DVector<f64>, n: usize) {
    if buf.len() != n {
        *buf = DVector::zeros(n);
    }
}

/// `out = v0 + h * sum(c_i * k_i)`
pub(crate) fn combine(out: &mut DVector<f64>, v0: &DVector<f64>, h: f64, terms: &[(f64, &DVector<f64>)]) {
    fit(out, v0.len());
    out.copy_from(v0);
    for (c, k) in terms {
        out.axpy(h * c, k, 1.0);
    }
}
