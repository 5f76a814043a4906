//! Runge-Kutta-Fehlberg 4(5) adaptive stepper.

use nalgebra::DVector;

use super::stepper::{combine, fit, DerivativeFn, Stepper};
use crate::error::{FlowError, Result};

/// Default absolute error tolerance.
pub const DEFAULT_EPS_ABS: f64 = 1e-3;

/// Below this scale factor the next step is halved (0.75^4).
const SHRINK_BELOW: f64 = 0.316_406_25;

/// Above this scale factor the next step is doubled (1.5^4).
const GROW_ABOVE: f64 = 5.0625;

/// Runge-Kutta-Fehlberg embedded 4(5) pair.
///
/// Six derivative evaluations per step. The 5th-order solution is
/// returned; the difference to the 4th-order one estimates the local error
/// `e`. With `s4 = eps_abs * h / (2 * max|e|)` (1 when `e` is zero) the
/// suggested next step is `h / 2` for `s4 < 0.75^4`, `2h` for `s4 > 1.5^4`,
/// and `h` otherwise. The suggestion never alters the step just taken.
#[derive(Debug, Clone)]
pub struct Rkf45 {
    eps_abs: f64,
    k: [DVector<f64>; 6],
    x: DVector<f64>,
    lower: DVector<f64>,
    last_error: f64,
}

impl Rkf45 {
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_EPS_ABS)
    }

    /// Stepper targeting absolute tolerance `eps_abs`.
    pub fn with_tolerance(eps_abs: f64) -> Self {
        Self {
            eps_abs,
            k: std::array::from_fn(|_| DVector::zeros(0)),
            x: DVector::zeros(0),
            lower: DVector::zeros(0),
            last_error: 0.0,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.eps_abs
    }

    /// Max absolute difference between the two solutions of the last step.
    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    /// Step size suggestion for error `max_err` after a step of size `h`.
    pub fn suggest(&self, h: f64, max_err: f64) -> f64 {
        let s4 = if max_err > 0.0 {
            self.eps_abs * h / (2.0 * max_err)
        } else {
            1.0
        };
        if s4 < SHRINK_BELOW {
            h / 2.0
        } else if s4 > GROW_ABOVE {
            2.0 * h
        } else {
            h
        }
    }
}

impl Default for Rkf45 {
    fn default() -> Self {
        Self::new()
    }
}

impl Stepper for Rkf45 {
    fn name(&self) -> &'static str {
        "rkf45"
    }

    fn is_adaptive(&self) -> bool {
        true
    }

    fn step(
        &mut self,
        f: &mut DerivativeFn<'_>,
        t0: f64,
        v0: &DVector<f64>,
        t1: f64,
        v1: &mut DVector<f64>,
    ) -> Result<f64> {
        if !(self.eps_abs > 0.0) {
            return Err(FlowError::invalid_config(format!(
                "rkf45 tolerance must be positive, got {}",
                self.eps_abs
            )));
        }

        let h = t1 - t0;
        let n = v0.len();
        let [k1, k2, k3, k4, k5, k6] = &mut self.k;
        for k in [&mut *k1, &mut *k2, &mut *k3, &mut *k4, &mut *k5, &mut *k6] {
            fit(k, n);
        }
        let x = &mut self.x;

        f(t0, v0, k1)?;

        combine(x, v0, h, &[(1.0 / 4.0, &*k1)]);
        f(t0 + h / 4.0, x, k2)?;

        combine(x, v0, h, &[(3.0 / 32.0, &*k1), (9.0 / 32.0, &*k2)]);
        f(t0 + 3.0 * h / 8.0, x, k3)?;

        combine(
            x,
            v0,
            h,
            &[
                (1932.0 / 2197.0, &*k1),
                (-7200.0 / 2197.0, &*k2),
                (7296.0 / 2197.0, &*k3),
            ],
        );
        f(t0 + 12.0 * h / 13.0, x, k4)?;

        combine(
            x,
            v0,
            h,
            &[
                (439.0 / 216.0, &*k1),
                (-8.0, &*k2),
                (3680.0 / 513.0, &*k3),
                (-845.0 / 4104.0, &*k4),
            ],
        );
        f(t1, x, k5)?;

        combine(
            x,
            v0,
            h,
            &[
                (-8.0 / 27.0, &*k1),
                (2.0, &*k2),
                (-3544.0 / 2565.0, &*k3),
                (1859.0 / 4104.0, &*k4),
                (-11.0 / 40.0, &*k5),
            ],
        );
        f(t0 + h / 2.0, x, k6)?;

        combine(
            &mut self.lower,
            v0,
            h,
            &[
                (25.0 / 216.0, &*k1),
                (1408.0 / 2565.0, &*k3),
                (2197.0 / 4104.0, &*k4),
                (-1.0 / 5.0, &*k5),
            ],
        );
        combine(
            v1,
            v0,
            h,
            &[
                (16.0 / 135.0, &*k1),
                (6656.0 / 12825.0, &*k3),
                (28561.0 / 56430.0, &*k4),
                (-9.0 / 50.0, &*k5),
                (2.0 / 55.0, &*k6),
            ],
        );

        self.last_error = v1
            .iter()
            .zip(self.lower.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        Ok(self.suggest(h, self.last_error))
    }
}
