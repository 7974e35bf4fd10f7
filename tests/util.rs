#![allow(dead_code)]
use adjoint_tape::backend::{AdjointValue, DenseField, DenseSpace};
use adjoint_tape::comm::RayonComm;
use adjoint_tape::tape::{
    Adjointer, BlockName, Equation, IdentityBlock, IdentityRhs, InitialValueRhs, Variable,
};

pub fn space(dim: usize) -> DenseSpace {
    DenseSpace::new("V", dim)
}

pub fn field(name: &str, vals: &[f64]) -> DenseField {
    DenseField::from_values(name, &DenseSpace::new("V", vals.len()), vals.to_vec()).unwrap()
}

/// Equation target = dep through an identity block.
pub fn identity_eq(
    target: Variable,
    dep: Variable,
    snapshot: &DenseField,
) -> Equation<DenseField> {
    Equation::new(
        target,
        vec![Box::new(IdentityBlock::new(
            BlockName::new("Identity: V"),
            snapshot.zero_like(),
        ))],
        Box::new(IdentityRhs::new(dep, snapshot.clone())),
    )
    .unwrap()
}

/// Initial-condition equation carrying a captured value.
pub fn ic_eq(target: Variable, value: &DenseField) -> Equation<DenseField> {
    let label = format!("Initial condition: {}", target.name());
    Equation::new(
        target,
        vec![Box::new(IdentityBlock::new(
            BlockName::new(label),
            value.zero_like(),
        ))],
        Box::new(InitialValueRhs::new(value.clone())),
    )
    .unwrap()
}

/// An adjointer holding the chain ic -> u:0:0 -> u:1:0 -> ... -> u:n-1:0.
pub fn chain_adjointer(n: usize, vals: &[f64]) -> (Adjointer<DenseField>, Vec<Variable>) {
    let ic = field("u", vals);
    let mut adj = Adjointer::new();
    let vars: Vec<Variable> = (0..n).map(|i| Variable::new("u", i, 0)).collect();
    adj.register_equation(ic_eq(vars[0].clone(), &ic)).unwrap();
    for i in 1..n {
        adj.register_equation(identity_eq(vars[i].clone(), vars[i - 1].clone(), &ic))
            .unwrap();
    }
    (adj, vars)
}

/// Observed convergence orders of an error sequence taken at halved step
/// sizes: `log2(e[i] / e[i+1])` for each consecutive pair.
pub fn convergence_order(errors: &[f64]) -> Vec<f64> {
    errors.windows(2).map(|w| (w[0] / w[1]).log2()).collect()
}

/// Scratch path under the system temp dir, unique per test process.
pub fn scratch_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("adjoint-tape-{tag}-{}", std::process::id()))
}

/// Two in-process ranks of one fresh communicator group.
pub fn rank_pair() -> (RayonComm, RayonComm) {
    let mut group = RayonComm::group(2);
    let c1 = group.remove(1);
    let c0 = group.remove(0);
    (c0, c1)
}
