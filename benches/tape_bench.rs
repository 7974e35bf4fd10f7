use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use adjoint_tape::backend::{AdjointValue, DenseField, DenseSpace};
use adjoint_tape::replay::{FnFunctional, ReplayState, replay_adjoint, replay_forward};
use adjoint_tape::tape::{
    Adjointer, BlockName, Equation, IdentityBlock, IdentityRhs, InitialValueRhs, Variable,
};

fn field(dofs: usize) -> DenseField {
    let space = DenseSpace::new("V", dofs);
    DenseField::from_values("u", &space, vec![1.0; dofs]).expect("field length matches space")
}

// A chain of identity copies: u_0 = ic, u_i = u_{i-1}.
fn build_chain_tape(n: usize, dofs: usize) -> (Adjointer<DenseField>, Vec<Variable>) {
    let ic = field(dofs);
    let mut adj = Adjointer::new();
    let vars: Vec<Variable> = (0..n).map(|i| Variable::new("u", i, 0)).collect();
    adj.register_equation(
        Equation::new(
            vars[0].clone(),
            vec![Box::new(IdentityBlock::new(
                BlockName::new("Initial condition: u"),
                ic.zero_like(),
            ))],
            Box::new(InitialValueRhs::new(ic.clone())),
        )
        .expect("nonempty block list"),
    )
    .expect("fresh tape accepts the initial condition");
    for i in 1..n {
        adj.register_equation(
            Equation::new(
                vars[i].clone(),
                vec![Box::new(IdentityBlock::new(
                    BlockName::new("Identity: V"),
                    ic.zero_like(),
                ))],
                Box::new(IdentityRhs::new(vars[i - 1].clone(), ic.clone())),
            )
            .expect("nonempty block list"),
        )
        .expect("chain dependencies are backward-only");
    }
    (adj, vars)
}

fn bench_tape(c: &mut Criterion) {
    let mut group = c.benchmark_group("tape");
    let dofs = 64;

    for &n in &[100usize, 1_000usize] {
        group.bench_with_input(BenchmarkId::new("register", n), &n, |b, &n| {
            b.iter(|| {
                let (adj, _) = build_chain_tape(n, dofs);
                black_box(adj.len());
            });
        });

        let (adj, vars) = build_chain_tape(n, dofs);
        group.bench_with_input(BenchmarkId::new("replay_forward", n), &n, |b, _| {
            b.iter(|| {
                let state = replay_forward(&adj, &ReplayState::new())
                    .expect("chain tape replays cleanly");
                black_box(state.len());
            });
        });

        let state = replay_forward(&adj, &ReplayState::new()).expect("chain tape replays cleanly");
        let last = vars[n - 1].clone();
        let functional = FnFunctional::new(
            "J",
            {
                let last = last.clone();
                move |state: &ReplayState<DenseField>| {
                    let u = state.try_get(&last)?;
                    u.dot(u)
                }
            },
            move |var: &Variable, state: &ReplayState<DenseField>| {
                if var == &last {
                    let mut g = state.try_get(var)?.clone();
                    g.scale(2.0);
                    Ok(Some(g))
                } else {
                    Ok(None)
                }
            },
        );
        group.bench_with_input(BenchmarkId::new("replay_adjoint", n), &n, |b, _| {
            b.iter(|| {
                let adjoints =
                    replay_adjoint(&adj, &functional, &state).expect("identity chain is adjointable");
                black_box(adjoints.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tape);
criterion_main!(benches);
