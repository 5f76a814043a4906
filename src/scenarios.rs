//! Canned demonstration models for the CLI frontend.
//!
//! Each scenario builds a [`Model`], an optional input callback and the
//! list of signals worth recording. [`run_scenario`] drives it over a
//! uniform time grid and returns the recorded [`History`].

use std::f64::consts::PI;

use clap::ValueEnum;
use tracing::info;

use crate::block::Model;
use crate::blocks::{Const, Delay, Gain, Integrator, Source};
use crate::error::{FlowError, Result};
use crate::signal::SignalId;
use crate::solver::{arange, Euler, History, InputCallback, Rk4, Rkf45, Simulator, SimulatorConfig, Stepper};

/// Available demonstration models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioKind {
    /// Undamped oscillator `x'' = -x`, `x(0) = 0.1`
    MassSpring,
    /// Integrator of a unit pulse train switched off on `[3, 7]`
    PulseIntegrator,
    /// Sine wave through a 0.5 s transport delay, plus its running integral
    Delay,
}

/// Available integration methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StepperKind {
    Euler,
    Rk4,
    Rkf45,
}

impl StepperKind {
    pub fn build(self) -> Box<dyn Stepper> {
        match self {
            StepperKind::Euler => Box::new(Euler::new()),
            StepperKind::Rk4 => Box::new(Rk4::new()),
            StepperKind::Rkf45 => Box::new(Rkf45::new()),
        }
    }
}

/// A model ready to simulate.
pub struct Scenario {
    pub model: Model,
    pub inputs: Option<InputCallback>,
    /// Signals recorded into the history, in column order
    pub tracked: Vec<SignalId>,
}

impl ScenarioKind {
    pub fn build(self) -> Result<Scenario> {
        match self {
            ScenarioKind::MassSpring => mass_spring(),
            ScenarioKind::PulseIntegrator => pulse_integrator(),
            ScenarioKind::Delay => delayed_sine(),
        }
    }
}

fn mass_spring() -> Result<Scenario> {
    let mut model = Model::new("mass_spring");
    let root = model.root();
    let x = model.scalar(root, "x")?;
    let xd = model.scalar(root, "xd")?;
    let xdd = model.scalar(root, "xdd")?;

    model.add_block(root, "position", Integrator::new(0.1), &[xd], &[x])?;
    model.add_block(root, "velocity", Integrator::new(0.0), &[xdd], &[xd])?;
    model.add_block(root, "spring", Gain::new(-1.0), &[x], &[xdd])?;

    Ok(Scenario {
        model,
        inputs: None,
        tracked: vec![x, xd],
    })
}

fn pulse_integrator() -> Result<Scenario> {
    let mut model = Model::new("pulse");
    let root = model.root();
    let xd = model.scalar(root, "xd")?;
    let x = model.scalar(root, "x")?;
    model.add_block(root, "integrator", Integrator::new(1.0), &[xd], &[x])?;

    let inputs: InputCallback = Box::new(move |signals, t| {
        let pulse = if t < 3.0 || t > 7.0 { 1.0 } else { 0.0 };
        signals.set_scalar(xd, pulse)
    });

    Ok(Scenario {
        model,
        inputs: Some(inputs),
        tracked: vec![xd, x],
    })
}

fn delayed_sine() -> Result<Scenario> {
    let mut model = Model::new("delay");
    let root = model.root();
    let x = model.scalar(root, "x")?;
    let lag = model.scalar(root, "lag")?;
    let initial = model.scalar(root, "initial")?;
    let y = model.scalar(root, "y")?;
    let area = model.scalar(root, "area")?;

    model.add_block(root, "sine", Source::new(|t| (PI * t / 5.0).sin()), &[], &[x])?;
    model.add_block(root, "lag", Const::new(0.5), &[], &[lag])?;
    model.add_block(root, "initial", Const::new(0.0), &[], &[initial])?;
    model.add_block(root, "transport", Delay::default(), &[x, lag, initial], &[y])?;
    model.add_block(root, "area", Integrator::new(0.0), &[y], &[area])?;

    Ok(Scenario {
        model,
        inputs: None,
        tracked: vec![x, y, area],
    })
}

/// Simulate `scenario` on the grid `0, dt, 2dt, ...` up to `t_end`.
pub fn run_scenario(
    scenario: Scenario,
    stepper: Box<dyn Stepper>,
    t_end: f64,
    dt: f64,
    config: SimulatorConfig,
) -> Result<History> {
    if !(dt > 0.0) {
        return Err(FlowError::invalid_config(format!("time step must be positive, got {dt}")));
    }

    let Scenario { model, inputs, tracked } = scenario;
    let stepper_name = stepper.name();
    let mut simulator = Simulator::with_config(model, Some(stepper), config);
    if let Some(inputs) = inputs {
        simulator.set_inputs(inputs);
    }

    let mut history = History::new();
    for id in tracked {
        history.track(simulator.signals(), id)?;
    }

    let mut k = 0;
    while let Some(t) = arange(k, 0.0, t_end, dt) {
        simulator.run(t)?;
        history.update(k, t, simulator.signals())?;
        k += 1;
    }

    let stats = simulator.stats();
    info!(
        stepper = stepper_name,
        rows = history.nrows(),
        accepted = stats.accepted_steps,
        rejected = stats.rejected_steps,
        passes = stats.scheduler.passes,
        "simulation finished"
    );
    Ok(history)
}
