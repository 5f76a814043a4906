//! Main simulator interface.

use nalgebra::DVector;
use tracing::{debug, warn};

use crate::block::{Model, Scheduler, SchedulerStats, SchedulingMode};
use crate::error::{FlowError, Result};
use crate::signal::SignalRegistry;

use super::state::StateVector;
use super::stepper::Stepper;
use super::{DEFAULT_MAX_TIME_STEP, DEFAULT_MIN_TIME_STEP};

/// Writes exogenous signals at the start of every scheduling pass.
pub type InputCallback = Box<dyn FnMut(&mut SignalRegistry, f64) -> Result<()>>;

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Smallest internal step; steps this small are always accepted.
    pub min_time_step: f64,
    /// Largest internal step an adaptive stepper may grow to.
    pub max_time_step: f64,
    /// Replay the previous evaluation order instead of re-scanning.
    pub reuse_order: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_time_step: DEFAULT_MIN_TIME_STEP,
            max_time_step: DEFAULT_MAX_TIME_STEP,
            reuse_order: false,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the smallest internal step; steps this small are always accepted.
    pub fn with_min_time_step(mut self, min_time_step: f64) -> Self {
        self.min_time_step = min_time_step;
        self
    }

    /// Set the largest internal step, also the first attempt of each `run`.
    pub fn with_max_time_step(mut self, max_time_step: f64) -> Self {
        self.max_time_step = max_time_step;
        self
    }

    /// Enable the cached evaluation order.
    ///
    /// Results are identical to the default scan; only models whose
    /// readiness pattern is stable between passes benefit.
    pub fn with_reuse_order(mut self, reuse_order: bool) -> Self {
        self.reuse_order = reuse_order;
        self
    }

    fn scheduling_mode(&self) -> SchedulingMode {
        if self.reuse_order {
            SchedulingMode::ReuseOrder
        } else {
            SchedulingMode::FixedPoint
        }
    }
}

fn check_steps(min_h: f64, max_h: f64) -> Result<()> {
    if !(min_h > 0.0) {
        return Err(FlowError::invalid_config(format!(
            "min_time_step must be positive, got {min_h}"
        )));
    }
    if !(max_h >= min_h) {
        return Err(FlowError::invalid_config(format!(
            "max_time_step ({max_h}) must not be below min_time_step ({min_h})"
        )));
    }
    Ok(())
}

/// Counters accumulated over a simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Completed `run` calls after initialization
    pub runs: u64,
    /// Internal stepper steps that were accepted
    pub accepted_steps: u64,
    /// Internal stepper steps that were retried with a smaller size
    pub rejected_steps: u64,
    pub scheduler: SchedulerStats,
}

/// Drives a [`Model`] through time.
///
/// Each [`run`](Simulator::run) call advances to the requested time,
/// taking as many internal stepper steps as needed, and leaves every
/// signal of the model evaluated at that time.
pub struct Simulator {
    model: Model,
    scheduler: Scheduler,
    stepper: Option<Box<dyn Stepper>>,
    inputs: Option<InputCallback>,
    config: SimulatorConfig,
    states: StateVector,
    /// Committed state at `t_prev`
    state_values: DVector<f64>,
    /// State at the start of the current internal step
    state_orig: DVector<f64>,
    t_prev: Option<f64>,
    stats: SimulatorStats,
}

impl Simulator {
    /// Create a new simulator for the given model with default configuration.
    pub fn new(model: Model, stepper: Option<Box<dyn Stepper>>) -> Self {
        Self::with_config(model, stepper, SimulatorConfig::default())
    }

    /// Create a new simulator for the given model with custom configuration.
    pub fn with_config(model: Model, stepper: Option<Box<dyn Stepper>>, config: SimulatorConfig) -> Self {
        Self {
            model,
            scheduler: Scheduler::new(config.scheduling_mode()),
            stepper,
            inputs: None,
            config,
            states: StateVector::default(),
            state_values: DVector::zeros(0),
            state_orig: DVector::zeros(0),
            t_prev: None,
            stats: SimulatorStats::default(),
        }
    }

    /// Install the input callback.
    pub fn with_inputs(mut self, inputs: impl FnMut(&mut SignalRegistry, f64) -> Result<()> + 'static) -> Self {
        self.inputs = Some(Box::new(inputs));
        self
    }

    /// Replace the input callback.
    pub fn set_inputs(&mut self, inputs: InputCallback) {
        self.inputs = Some(inputs);
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn signals(&self) -> &SignalRegistry {
        self.model.signals()
    }

    /// Give the model back, e.g. to inspect block state after a run.
    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Time of the last completed `init` or `run`.
    pub fn time(&self) -> Option<f64> {
        self.t_prev
    }

    pub fn is_initialized(&self) -> bool {
        self.t_prev.is_some()
    }

    /// Number of `f64` elements in the state vector.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Committed state vector in discovery order.
    pub fn state(&self) -> &DVector<f64> {
        &self.state_values
    }

    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            scheduler: self.scheduler.stats(),
            ..self.stats
        }
    }

    /// Validate the model, discover state variables and evaluate the model
    /// at `t0`.
    pub fn init(&mut self, t0: f64) -> Result<()> {
        self.model.validate()?;
        self.states = StateVector::discover(&self.model)?;

        if self.states.is_empty() {
            if self.stepper.is_some() {
                warn!("a stepper is provided but the model has no state variables; it will be ignored");
            }
        } else if self.stepper.is_none() {
            return Err(FlowError::MissingStepper {
                states: self.states.len(),
            });
        }
        debug!(states = self.states.len(), blocks = self.model.leaves().len(), "simulator initialized");

        self.states.clear(self.model.signals_mut());
        self.process_model(t0, true, true)?;
        self.states
            .get_state_variables(self.model.signals(), &mut self.state_values)?;
        self.t_prev = Some(t0);
        Ok(())
    }

    /// Advance to `t` with the configured step bounds.
    pub fn run(&mut self, t: f64) -> Result<()> {
        let (min_h, max_h) = (self.config.min_time_step, self.config.max_time_step);
        self.run_with_steps(t, min_h, max_h)
    }

    /// Advance to `t`, keeping internal steps within `[min_h, max_h]`.
    ///
    /// The first call on an uninitialized simulator initializes it at `t`.
    pub fn run_with_steps(&mut self, t: f64, min_h: f64, max_h: f64) -> Result<()> {
        check_steps(min_h, max_h)?;
        let Some(t_prev) = self.t_prev else {
            return self.init(t);
        };

        if t < t_prev {
            return Err(FlowError::TimeRegression { time: t, previous: t_prev });
        }

        if t == t_prev {
            warn!(t, "repeated simulation step");
            if !self.states.is_empty() {
                self.states.clear(self.model.signals_mut());
                self.call_inputs(t)?;
                self.model.pre_step(t)?;
                self.states
                    .get_state_variables(self.model.signals(), &mut self.state_values)?;
            }
        } else if !self.states.is_empty() {
            self.integrate(t_prev, t, min_h, max_h)?;
        }

        self.states
            .reset_with_state_variables(self.model.signals_mut(), &self.state_values)?;
        let call_pre_step = self.states.is_empty();
        self.process_model(t, call_pre_step, true)?;
        self.t_prev = Some(t);
        self.stats.runs += 1;
        Ok(())
    }

    /// Step the state from `t_start` to `t_end`, retrying rejected steps.
    fn integrate(&mut self, t_start: f64, t_end: f64, min_h: f64, max_h: f64) -> Result<()> {
        let mut t1 = t_start;
        let mut t2 = (t1 + max_h).min(t_end);
        let mut force_accept = false;

        while t1 < t_end {
            self.states.clear(self.model.signals_mut());
            self.call_inputs(t1)?;
            self.model.pre_step(t1)?;
            self.states
                .get_state_variables(self.model.signals(), &mut self.state_orig)?;

            let new_h = self.step_once(t1, t2)?;
            let h = t2 - t1;

            if force_accept || new_h >= h || h <= min_h {
                force_accept = false;
                self.stats.accepted_steps += 1;
                let new_h = new_h.min(max_h).max(min_h);
                t1 = t2;
                t2 = (t1 + new_h).min(t_end);
                if t1 < t_end {
                    self.states
                        .reset_with_state_variables(self.model.signals_mut(), &self.state_values)?;
                    self.process_model(t1, false, true)?;
                }
            } else {
                self.stats.rejected_steps += 1;
                debug!(t = t1, h, new_h, "step rejected");
                force_accept = new_h <= min_h;
                let new_h = new_h.min(max_h).max(min_h);
                t2 = t1 + new_h;
            }
        }
        Ok(())
    }

    /// One stepper call from `state_orig` at `t1` to `t2`, into `state_values`.
    fn step_once(&mut self, t1: f64, t2: f64) -> Result<f64> {
        let Simulator {
            model,
            scheduler,
            stepper,
            inputs,
            states,
            state_values,
            state_orig,
            ..
        } = self;
        let stepper = stepper.as_mut().ok_or(FlowError::MissingStepper { states: states.len() })?;

        let mut derivatives = |t: f64, x: &DVector<f64>, dx: &mut DVector<f64>| -> Result<()> {
            states.reset_with_state_variables(model.signals_mut(), x)?;
            if let Some(cb) = inputs.as_mut() {
                cb(model.signals_mut(), t)?;
            }
            scheduler.process(model, t)?;
            states.get_derivatives(model.signals(), dx)
        };
        stepper.step(&mut derivatives, t1, state_orig, t2, state_values)
    }

    /// Inputs, optional `pre_step`, a scheduling pass, optional `post_step`.
    fn process_model(&mut self, t: f64, call_pre_step: bool, call_post_step: bool) -> Result<()> {
        self.call_inputs(t)?;
        if call_pre_step {
            self.model.pre_step(t)?;
        }
        self.scheduler.process(&mut self.model, t)?;
        if call_post_step {
            self.model.post_step(t)?;
        }
        Ok(())
    }

    fn call_inputs(&mut self, t: f64) -> Result<()> {
        match self.inputs.as_mut() {
            Some(cb) => cb(self.model.signals_mut(), t),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Gain, Integrator, Memory};
    use crate::solver::{Euler, Rk4};
    use approx::assert_relative_eq;

    fn decay_model() -> (Model, crate::signal::SignalId) {
        let mut model = Model::new("decay");
        let root = model.root();
        let x = model.scalar(root, "x").unwrap();
        let xd = model.scalar(root, "xd").unwrap();
        model.add_block(root, "int", Integrator::new(1.0), &[xd], &[x]).unwrap();
        model.add_block(root, "k", Gain::new(-1.0), &[x], &[xd]).unwrap();
        (model, x)
    }

    #[test]
    fn test_config_builder() {
        let config = SimulatorConfig::new()
            .with_min_time_step(1e-4)
            .with_max_time_step(0.5)
            .with_reuse_order(true);
        assert_eq!(config.min_time_step, 1e-4);
        assert_eq!(config.max_time_step, 0.5);
        assert_eq!(config.scheduling_mode(), SchedulingMode::ReuseOrder);
    }

    #[test]
    fn test_first_run_initializes() {
        let (model, x) = decay_model();
        let mut sim = Simulator::new(model, Some(Box::new(Rk4::new())));
        assert!(!sim.is_initialized());
        sim.run(0.0).unwrap();
        assert_eq!(sim.time(), Some(0.0));
        assert_eq!(sim.signals().get_scalar(x).unwrap(), 1.0);
        assert_eq!(sim.num_states(), 1);
    }

    #[test]
    fn test_missing_stepper_is_an_error() {
        let (model, _) = decay_model();
        let mut sim = Simulator::new(model, None);
        assert!(matches!(
            sim.init(0.0),
            Err(FlowError::MissingStepper { states: 1 })
        ));
    }

    #[test]
    fn test_time_regression_rejected() {
        let (model, _) = decay_model();
        let mut sim = Simulator::new(model, Some(Box::new(Euler::new())));
        sim.init(0.0).unwrap();
        sim.run(0.5).unwrap();
        let err = sim.run(0.25).unwrap_err();
        assert!(matches!(err, FlowError::TimeRegression { .. }));
    }

    #[test]
    fn test_repeated_time_is_idempotent() {
        let (model, x) = decay_model();
        let mut sim = Simulator::new(model, Some(Box::new(Rk4::new())));
        sim.init(0.0).unwrap();
        sim.run(0.1).unwrap();
        let before = sim.signals().get_scalar(x).unwrap();
        sim.run(0.1).unwrap();
        assert_eq!(sim.signals().get_scalar(x).unwrap(), before);
        assert_eq!(sim.stats().accepted_steps, 1);
    }

    #[test]
    fn test_invalid_step_bounds() {
        let (model, _) = decay_model();
        let mut sim = Simulator::new(model, Some(Box::new(Rk4::new())));
        sim.init(0.0).unwrap();
        assert!(matches!(
            sim.run_with_steps(1.0, 0.0, 1.0),
            Err(FlowError::InvalidConfig { .. })
        ));
        assert!(matches!(
            sim.run_with_steps(1.0, 0.1, 0.01),
            Err(FlowError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_long_interval_split_by_max_step() {
        let (model, x) = decay_model();
        let config = SimulatorConfig::new().with_max_time_step(0.125);
        let mut sim = Simulator::with_config(model, Some(Box::new(Rk4::new())), config);
        sim.init(0.0).unwrap();
        sim.run(1.0).unwrap();
        assert_eq!(sim.stats().accepted_steps, 8);
        assert_relative_eq!(sim.signals().get_scalar(x).unwrap(), (-1.0f64).exp(), epsilon = 1e-5);
    }

    #[test]
    fn test_stateless_model_runs_without_stepper() {
        let mut model = Model::new("m");
        let root = model.root();
        let u = model.scalar(root, "u").unwrap();
        let y = model.scalar(root, "y").unwrap();
        model.add_block(root, "mem", Memory::new(0.0), &[u], &[y]).unwrap();

        let mut sim = Simulator::new(model, None).with_inputs(move |signals, t| signals.set_scalar(u, t));
        let mut seen = Vec::new();
        for k in 0..4 {
            sim.run(k as f64).unwrap();
            seen.push(sim.signals().get_scalar(y).unwrap());
        }
        assert_eq!(seen, vec![0.0, 0.0, 1.0, 2.0]);
    }
}
