mod util;
use util::*;

use adjoint_tape::annotate::PointIntegralSolver;
use adjoint_tape::backend::{AdjointValue, DenseField, DenseSpace, FnStepper, SchemeStepper};
use adjoint_tape::replay::{FnFunctional, ReplayState, replay_adjoint, replay_forward};
use adjoint_tape::tape::{Adjointer, CheckpointStrategy, Variable};
use adjoint_tape::tape_error::TapeError;

/// Explicit Euler on du/dt = a * u: coefficients are [u, a].
fn growth_stepper() -> impl SchemeStepper<DenseField> {
    FnStepper::new(
        |u: &DenseField, coeffs: &[DenseField], _time: f64, dt: f64| -> Result<DenseField, TapeError> {
            let next: Vec<f64> = u
                .data()
                .iter()
                .zip(coeffs[1].data())
                .map(|(x, r)| x * (1.0 + dt * r))
                .collect();
            let mut out = u.clone();
            out.set_local_values(&next)?;
            Ok(out)
        },
    )
}

fn growth_solver() -> PointIntegralSolver<DenseField, DenseSpace, impl SchemeStepper<DenseField>> {
    let u = field("u", &[1.0, 2.0]);
    let a = field("a", &[1.0, 0.5]);
    PointIntegralSolver::new(growth_stepper(), space(2), u.clone(), vec![u, a], 0.0)
}

#[test]
fn each_step_appends_one_equation() {
    let mut adj = Adjointer::new();
    let mut solver = growth_solver();

    solver.step(&mut adj, 0.5, None).unwrap();
    // two initial conditions (u and a) plus the step itself
    assert_eq!(adj.len(), 3);
    assert_eq!(solver.solution().data(), &[1.5, 2.5]);
    assert_eq!(solver.time(), 0.5);
    assert_eq!(*adj.equations()[2].target(), Variable::new("u", 0, 1));

    solver.step(&mut adj, 0.5, None).unwrap();
    // both coefficients are already tracked, so only the step is added
    assert_eq!(adj.len(), 4);
    assert_eq!(solver.solution().data(), &[2.25, 3.125]);
    assert_eq!(*adj.equations()[3].target(), Variable::new("u", 0, 2));
    assert_eq!(
        adj.equations()[3].rhs().dependencies(),
        vec![Variable::new("u", 0, 1), Variable::new("a", 0, 0)]
    );

    // stepping bumps iterations; the timestep counter is untouched
    assert_eq!(adj.timestep(), 0);
}

#[test]
fn replay_recomputes_the_trajectory() {
    let mut adj = Adjointer::new();
    let mut solver = growth_solver();
    solver.step(&mut adj, 0.5, None).unwrap();
    solver.step(&mut adj, 0.5, None).unwrap();

    let state = replay_forward(&adj, &ReplayState::new()).unwrap();
    assert_eq!(
        state.try_get(&Variable::new("u", 0, 1)).unwrap().data(),
        &[1.5, 2.5]
    );
    assert_eq!(
        state.try_get(&Variable::new("u", 0, 2)).unwrap().data(),
        solver.solution().data()
    );
}

#[test]
fn pinned_rate_changes_the_replayed_trajectory() {
    let mut adj = Adjointer::new();
    let mut solver = growth_solver();
    solver.step(&mut adj, 0.5, None).unwrap();
    solver.step(&mut adj, 0.5, None).unwrap();

    // zero growth rate freezes the solution
    let pinned: ReplayState<DenseField> =
        [(Variable::new("a", 0, 0), field("a", &[0.0, 0.0]))]
            .into_iter()
            .collect();
    let state = replay_forward(&adj, &pinned).unwrap();
    assert_eq!(
        state.try_get(&Variable::new("u", 0, 2)).unwrap().data(),
        &[1.0, 2.0]
    );
}

#[test]
fn solution_missing_from_the_coefficients_is_rejected() {
    let mut adj = Adjointer::new();
    let u = field("u", &[1.0, 2.0]);
    let a = field("a", &[1.0, 0.5]);
    let mut solver = PointIntegralSolver::new(growth_stepper(), space(2), u, vec![a], 0.0);

    let err = solver.step(&mut adj, 0.5, None).unwrap_err();
    assert!(matches!(err, TapeError::NotImplemented(_)));
    // nothing was taped and the solver did not advance
    assert!(adj.is_empty());
    assert_eq!(solver.time(), 0.0);

    // without annotation the same scheme steps fine
    solver.step(&mut adj, 0.5, Some(false)).unwrap();
    assert!(adj.is_empty());
    assert_eq!(solver.time(), 0.5);
}

#[test]
fn paused_annotation_skips_the_tape() {
    let mut adj = Adjointer::new();
    adj.pause_annotation();
    let mut solver = growth_solver();
    solver.step(&mut adj, 0.5, None).unwrap();
    assert!(adj.is_empty());
    assert_eq!(solver.solution().data(), &[1.5, 2.5]);
}

#[test]
fn record_all_keeps_every_post_step_solution() {
    let mut adj = Adjointer::new();
    adj.set_record_all(true);
    let mut solver = growth_solver();
    solver.step(&mut adj, 0.5, None).unwrap();
    solver.step(&mut adj, 0.5, None).unwrap();

    assert_eq!(
        adj.recorded(&Variable::new("u", 0, 1)).unwrap().data(),
        &[1.5, 2.5]
    );
    assert_eq!(
        adj.recorded(&Variable::new("u", 0, 2)).unwrap().data(),
        &[2.25, 3.125]
    );
    // initial conditions were recorded on registration
    assert_eq!(
        adj.recorded(&Variable::new("a", 0, 0)).unwrap().data(),
        &[1.0, 0.5]
    );
}

#[test]
fn memory_checkpoints_snapshot_the_pre_step_coefficients() {
    let mut adj = Adjointer::with_strategy(CheckpointStrategy::Memory);
    let mut solver = growth_solver();
    solver.step(&mut adj, 0.5, None).unwrap();

    assert_eq!(
        adj.recorded(&Variable::new("u", 0, 0)).unwrap().data(),
        &[1.0, 2.0]
    );
    assert_eq!(
        adj.recorded(&Variable::new("a", 0, 0)).unwrap().data(),
        &[1.0, 0.5]
    );
    // the post-step solution itself is not checkpointed
    assert!(!adj.has_recorded(&Variable::new("u", 0, 1)));
}

#[test]
fn adjoint_through_a_step_is_not_implemented() {
    let mut adj = Adjointer::new();
    let mut solver = growth_solver();
    solver.step(&mut adj, 0.5, None).unwrap();
    let state = replay_forward(&adj, &ReplayState::new()).unwrap();

    let last = Variable::new("u", 0, 1);
    let functional = FnFunctional::new(
        "sum",
        {
            let last = last.clone();
            move |state: &ReplayState<DenseField>| {
                Ok(state.try_get(&last)?.data().iter().sum::<f64>())
            }
        },
        move |var: &Variable, _state: &ReplayState<DenseField>| {
            if *var == last {
                Ok(Some(field("u", &[1.0, 1.0])))
            } else {
                Ok(None)
            }
        },
    );
    let err = replay_adjoint(&adj, &functional, &state).unwrap_err();
    assert!(matches!(err, TapeError::NotImplemented(_)));
}
