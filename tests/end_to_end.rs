//! Whole-model simulations through the public API.

use std::f64::consts::PI;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use blockflow_core::blocks::{AddSub, Const, Delay, Gain, Integrator, Memory, Source};
use blockflow_core::solver::{arange, Euler, Rk4, Rkf45};
use blockflow_core::{FlowError, History, Model, SignalId, Simulator, SimulatorConfig};

fn sample(sim: &mut Simulator, history: &mut History, t_end: f64, dt: f64) {
    let mut k = 0;
    while let Some(t) = arange(k, 0.0, t_end, dt) {
        sim.run(t).unwrap();
        history.update(k, t, sim.signals()).unwrap();
        k += 1;
    }
}

#[test]
fn test_source_through_gain_at_init() {
    let mut model = Model::new("m");
    let root = model.root();
    let x = model.scalar(root, "x").unwrap();
    let y = model.scalar(root, "y").unwrap();
    model.add_block(root, "src", Source::new(|t| (PI * t / 5.0).sin()), &[], &[x]).unwrap();
    model.add_block(root, "gain", Gain::new(2.0), &[x], &[y]).unwrap();

    let mut sim = Simulator::new(model, None);
    sim.init(0.0).unwrap();
    assert_eq!(sim.signals().get_scalar(y).unwrap(), 0.0);

    sim.run(2.5).unwrap();
    assert_relative_eq!(sim.signals().get_scalar(y).unwrap(), 2.0, epsilon = 1e-12);
}

#[test]
fn test_pulse_integrator_with_rk4() {
    let mut model = Model::new("pulse");
    let root = model.root();
    let xd = model.scalar(root, "xd").unwrap();
    let x = model.scalar(root, "x").unwrap();
    model.add_block(root, "int", Integrator::new(1.0), &[xd], &[x]).unwrap();

    let mut sim = Simulator::new(model, Some(Box::new(Rk4::new()))).with_inputs(move |signals, t| {
        signals.set_scalar(xd, if t < 3.0 || t > 7.0 { 1.0 } else { 0.0 })
    });

    // Binary-exact grid, so stage times land exactly on the switching instants.
    // On a 0.1 grid the same plateau x(3) = x(7) = 4 - h/6 (3.98333) holds, but
    // only up to the rounding of the accumulated sample times.
    let h = 0.125;
    let mut history = History::new();
    history.track(sim.signals(), x).unwrap();
    sample(&mut sim, &mut history, 10.0, h);

    let xs = history.column(x).unwrap();
    let at = |t: f64| xs[(t / h) as usize];
    assert_abs_diff_eq!(at(2.5), 3.5, epsilon = 1e-9);
    // the last stage of the step ending at 3 already sees the input off
    assert_abs_diff_eq!(at(3.0), 4.0 - h / 6.0, epsilon = 1e-9);
    assert_abs_diff_eq!(at(5.0), at(3.0), epsilon = 1e-12);
    assert_abs_diff_eq!(at(7.0), at(3.0), epsilon = 1e-12);
    assert_abs_diff_eq!(at(10.0), at(7.0) + 3.0 - h / 6.0, epsilon = 1e-9);
}

fn mass_spring(x0: f64) -> (Model, SignalId, SignalId) {
    let mut model = Model::new("mass_spring");
    let root = model.root();
    let x = model.scalar(root, "x").unwrap();
    let xd = model.scalar(root, "xd").unwrap();
    let xdd = model.scalar(root, "xdd").unwrap();
    model.add_block(root, "pos", Integrator::new(x0), &[xd], &[x]).unwrap();
    model.add_block(root, "vel", Integrator::new(0.0), &[xdd], &[xd]).unwrap();
    model.add_block(root, "spring", Gain::new(-1.0), &[x], &[xdd]).unwrap();
    (model, x, xd)
}

#[test]
fn test_mass_spring_conserves_energy() {
    let (model, x, xd) = mass_spring(0.1);
    let mut sim = Simulator::new(model, Some(Box::new(Rk4::new())));
    let energy = |sim: &Simulator| {
        let p = sim.signals().get_scalar(x).unwrap();
        let v = sim.signals().get_scalar(xd).unwrap();
        p * p + v * v
    };

    sim.init(0.0).unwrap();
    let e0 = energy(&sim);
    assert_relative_eq!(e0, 0.01);

    for k in 1..=500 {
        sim.run(k as f64 * 0.01).unwrap();
        assert_relative_eq!(energy(&sim), e0, max_relative = 1e-9);
    }
    assert_relative_eq!(sim.signals().get_scalar(x).unwrap(), 0.1 * 5.0f64.cos(), epsilon = 1e-9);
}

#[test]
fn test_rk4_constant_derivative_is_exact() {
    let mut model = Model::new("ramp");
    let root = model.root();
    let c = model.scalar(root, "c").unwrap();
    let x = model.scalar(root, "x").unwrap();
    model.add_block(root, "rate", Const::new(0.5), &[], &[c]).unwrap();
    model.add_block(root, "int", Integrator::new(-2.0), &[c], &[x]).unwrap();

    let mut sim = Simulator::new(model, Some(Box::new(Rk4::new())));
    sim.init(0.0).unwrap();
    for n in 1..=8 {
        sim.run(n as f64 * 0.25).unwrap();
        assert_relative_eq!(sim.signals().get_scalar(x).unwrap(), -2.0 + 0.5 * n as f64 * 0.25, epsilon = 1e-12);
    }
}

#[test]
fn test_memory_lags_one_step() {
    let mut model = Model::new("m");
    let root = model.root();
    let u = model.scalar(root, "u").unwrap();
    let y = model.scalar(root, "y").unwrap();
    model.add_block(root, "clock", Source::new(|t| t), &[], &[u]).unwrap();
    model.add_block(root, "mem", Memory::new(-1.0), &[u], &[y]).unwrap();

    let mut sim = Simulator::new(model, None);
    let mut history = History::new();
    history.track(sim.signals(), y).unwrap();
    sample(&mut sim, &mut history, 3.0, 1.0);
    assert_eq!(history.column(y).unwrap(), &[-1.0, 0.0, 1.0, 2.0]);
}

#[test]
fn test_memory_breaks_feedback_loop() {
    // y[k] = y[k-1] + 1 through an adder and a memory
    let mut model = Model::new("counter");
    let root = model.root();
    let one = model.scalar(root, "one").unwrap();
    let prev = model.scalar(root, "prev").unwrap();
    let next = model.scalar(root, "next").unwrap();
    model.add_block(root, "sum", AddSub::new("++").unwrap(), &[prev, one], &[next]).unwrap();
    model.add_block(root, "mem", Memory::new(0.0), &[next], &[prev]).unwrap();
    model.add_block(root, "one", Const::new(1.0), &[], &[one]).unwrap();

    let mut sim = Simulator::new(model, None);
    for k in 0..5 {
        sim.run(k as f64).unwrap();
    }
    assert_eq!(sim.signals().get_scalar(next).unwrap(), 5.0);
}

#[test]
fn test_delay_interpolates_between_samples() {
    let mut model = Model::new("m");
    let root = model.root();
    let x = model.scalar(root, "x").unwrap();
    let lag = model.scalar(root, "lag").unwrap();
    let init = model.scalar(root, "init").unwrap();
    let y = model.scalar(root, "y").unwrap();
    model.add_block(root, "ramp", Source::new(|t| t), &[], &[x]).unwrap();
    model.add_block(root, "lag", Const::new(0.75), &[], &[lag]).unwrap();
    model.add_block(root, "init", Const::new(-1.0), &[], &[init]).unwrap();
    model.add_block(root, "delay", Delay::default(), &[x, lag, init], &[y]).unwrap();

    let mut sim = Simulator::new(model, None);
    let mut history = History::new();
    history.track(sim.signals(), y).unwrap();
    sample(&mut sim, &mut history, 1.5, 0.5);

    let ys = history.column(y).unwrap();
    assert_eq!(ys[0], -1.0);
    assert_eq!(ys[1], -1.0);
    assert_abs_diff_eq!(ys[2], 0.25, epsilon = 1e-12);
    assert_abs_diff_eq!(ys[3], 0.75, epsilon = 1e-12);
}

#[test]
fn test_algebraic_loop_deadlocks() {
    let mut model = Model::new("loop");
    let root = model.root();
    let a = model.scalar(root, "a").unwrap();
    let b = model.scalar(root, "b").unwrap();
    model.add_block(root, "loop_a", Gain::new(1.0), &[a], &[b]).unwrap();
    model.add_block(root, "loop_b", Gain::new(1.0), &[b], &[a]).unwrap();

    let mut sim = Simulator::new(model, None);
    match sim.init(0.0) {
        Err(FlowError::Deadlock(report)) => {
            assert_eq!(report.blocks.len(), 2);
            assert!(report.blocks.iter().any(|b| b.block.ends_with("loop_a")));
            assert!(report.blocks.iter().all(|b| b.unassigned.len() == 1));
        }
        other => panic!("expected deadlock, got {other:?}"),
    }
}

#[test]
fn test_adaptive_stepper_rejects_and_converges() {
    let mut model = Model::new("decay");
    let root = model.root();
    let x = model.scalar(root, "x").unwrap();
    let xd = model.scalar(root, "xd").unwrap();
    model.add_block(root, "int", Integrator::new(1.0), &[xd], &[x]).unwrap();
    model.add_block(root, "rate", Gain::new(-1.0), &[x], &[xd]).unwrap();

    let config = SimulatorConfig::new().with_min_time_step(1e-4);
    let mut sim = Simulator::with_config(model, Some(Box::new(Rkf45::with_tolerance(1e-6))), config);
    sim.init(0.0).unwrap();
    sim.run(2.0).unwrap();

    let stats = sim.stats();
    assert!(stats.rejected_steps > 0);
    assert!(stats.accepted_steps > 2);
    assert_abs_diff_eq!(sim.signals().get_scalar(x).unwrap(), (-2.0f64).exp(), epsilon = 1e-5);
    assert_eq!(sim.time(), Some(2.0));
}

#[test]
fn test_time_regression_and_repeat() {
    let (model, x, _) = mass_spring(1.0);
    let mut sim = Simulator::new(model, Some(Box::new(Euler::new())));
    sim.init(0.0).unwrap();
    sim.run(0.5).unwrap();
    let x_half = sim.signals().get_scalar(x).unwrap();

    sim.run(0.5).unwrap();
    assert_eq!(sim.signals().get_scalar(x).unwrap(), x_half);

    let err = sim.run(0.4).unwrap_err();
    assert!(matches!(err, FlowError::TimeRegression { time, previous } if time == 0.4 && previous == 0.5));
}

#[test]
fn test_states_without_stepper_fail_at_init() {
    let (model, ..) = mass_spring(1.0);
    let mut sim = Simulator::new(model, None);
    assert!(matches!(sim.init(0.0), Err(FlowError::MissingStepper { states: 2 })));
}

#[test]
fn test_unconnected_block_fails_at_init() {
    let mut model = Model::new("m");
    let root = model.root();
    model.insert(root, "dangling", Gain::new(1.0)).unwrap();
    let mut sim = Simulator::new(model, None);
    assert!(matches!(sim.init(0.0), Err(FlowError::NotConnected { .. })));
}

#[test]
fn test_reuse_order_matches_fixed_point() {
    let run = |reuse_order: bool| {
        let (mut model, x, xd) = mass_spring(0.3);
        let root = model.root();
        let prev = model.scalar(root, "prev").unwrap();
        let diff = model.scalar(root, "diff").unwrap();
        model.add_block(root, "mem", Memory::new(0.0), &[x], &[prev]).unwrap();
        model.add_block(root, "diff", AddSub::new("+-").unwrap(), &[x, prev], &[diff]).unwrap();

        let config = SimulatorConfig::new().with_reuse_order(reuse_order);
        let mut sim = Simulator::with_config(model, Some(Box::new(Rk4::new())), config);
        let mut history = History::new();
        for id in [x, xd, diff] {
            history.track(sim.signals(), id).unwrap();
        }
        sample(&mut sim, &mut history, 2.0, 0.05);
        (history, [x, xd, diff], sim.stats().scheduler)
    };

    let (plain, ids, plain_stats) = run(false);
    let (cached, _, cached_stats) = run(true);
    for id in ids {
        assert_eq!(plain.column(id), cached.column(id));
    }
    assert_eq!(plain_stats.passes, cached_stats.passes);
    assert!(cached_stats.sweeps <= plain_stats.sweeps);
}
