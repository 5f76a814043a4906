//! Classic 4th-order Runge-Kutta stepper.

use nalgebra::DVector;

use super::stepper::{combine, fit, DerivativeFn, Stepper};
use crate::error::Result;

/// Classic 4th-order Runge-Kutta.
///
/// Four derivative evaluations per step, fixed step size. Tableau:
/// ```text
/// c = [0, 1/2, 1/2, 1]
/// a = [[], [1/2], [0, 1/2], [0, 0, 1]]
/// b = [1/6, 1/3, 1/3, 1/6]
/// ```
#[derive(Debug, Clone)]
pub struct Rk4 {
    k: [DVector<f64>; 4],
    x: DVector<f64>,
}

impl Rk4 {
    pub fn new() -> Self {
        Self {
            k: std::array::from_fn(|_| DVector::zeros(0)),
            x: DVector::zeros(0),
        }
    }
}

impl Default for Rk4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Stepper for Rk4 {
    fn name(&self) -> &'static str {
        "rk4"
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
        let n = v0.len();
        let [k1, k2, k3, k4] = &mut self.k;
        for k in [&mut *k1, &mut *k2, &mut *k3, &mut *k4] {
            fit(k, n);
        }
        let x = &mut self.x;

        f(t0, v0, k1)?;
        combine(x, v0, h, &[(0.5, &*k1)]);
        f(t0 + 0.5 * h, x, k2)?;
        combine(x, v0, h, &[(0.5, &*k2)]);
        f(t0 + 0.5 * h, x, k3)?;
        combine(x, v0, h, &[(1.0, &*k3)]);
        f(t1, x, k4)?;

        combine(
            v1,
            v0,
            h,
            &[
                (1.0 / 6.0, &*k1),
                (1.0 / 3.0, &*k2),
                (1.0 / 3.0, &*k3),
                (1.0 / 6.0, &*k4),
            ],
        );
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_for_cubic_in_time() {
        // x' = 3t^2 integrates exactly to t^3
        let mut rk4 = Rk4::new();
        let mut f = |t: f64, _x: &DVector<f64>, dx: &mut DVector<f64>| -> Result<()> {
            dx[0] = 3.0 * t * t;
            Ok(())
        };
        let mut v = DVector::from_vec(vec![0.0]);
        let mut next = DVector::zeros(1);
        for i in 0..4 {
            let t0 = i as f64 * 0.5;
            rk4.step(&mut f, t0, &v, t0 + 0.5, &mut next).unwrap();
            v.copy_from(&next);
        }
        assert_relative_eq!(v[0], 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_exponential_decay_accuracy() {
        let mut rk4 = Rk4::new();
        let mut f = |_t: f64, x: &DVector<f64>, dx: &mut DVector<f64>| -> Result<()> {
            dx.copy_from(&(-x));
            Ok(())
        };
        let mut v = DVector::from_vec(vec![1.0, 2.0]);
        let mut next = DVector::zeros(2);
        for i in 0..10 {
            let t0 = i as f64 * 0.1;
            let new_h = rk4.step(&mut f, t0, &v, t0 + 0.1, &mut next).unwrap();
            assert_relative_eq!(new_h, 0.1, epsilon = 1e-15);
            v.copy_from(&next);
        }
        assert_relative_eq!(v[0], (-1.0f64).exp(), epsilon = 1e-6);
        assert_relative_eq!(v[1], 2.0 * (-1.0f64).exp(), epsilon = 1e-6);
    }
}
