//! Time integration of a model.
//!
//! The [`Simulator`] advances a [`Model`](crate::block::Model) from one
//! requested time to the next. Between them it packs every state variable
//! into a [`StateVector`] and hands it to a [`Stepper`], whose derivative
//! callback re-runs the input callback and a scheduling pass for each
//! stage.
//!
//! ## Steppers
//!
//! | Stepper   | Order | Evaluations | Step size |
//! |-----------|-------|-------------|-----------|
//! | [`Euler`] | 1     | 1           | fixed     |
//! | [`Rk4`]   | 4     | 4           | fixed     |
//! | [`Rkf45`] | 5(4)  | 6           | adaptive  |
//!
//! A stepper returns the size it suggests for the next step. The run loop
//! retries a step whenever the suggestion is smaller than the step just
//! taken, down to the configured minimum.

mod euler;
mod history;
mod rk4;
mod rkf45;
mod simulator;
mod state;
mod stepper;

pub use euler::Euler;
pub use history::History;
pub use rk4::Rk4;
pub use rkf45::{Rkf45, DEFAULT_EPS_ABS};
pub use simulator::{InputCallback, Simulator, SimulatorConfig, SimulatorStats};
pub use state::StateVector;
pub use stepper::{DerivativeFn, Stepper};

/// Default lower bound on internal step size.
pub const DEFAULT_MIN_TIME_STEP: f64 = 1e-3;

/// Default upper bound on internal step size.
pub const DEFAULT_MAX_TIME_STEP: f64 = 1.0;

/// The `k`-th point of the grid `t_init, t_init + dt, ...` up to `t_end`.
///
/// Computed by multiplication so long grids do not accumulate rounding.
pub fn arange(k: usize, t_init: f64, t_end: f64, dt: f64) -> Option<f64> {
    let t = t_init + k as f64 * dt;
    (t <= t_end).then_some(t)
}
