//! Replay: recomputing forward states and adjoint sweeps from the tape.
//!
//! Forward replay walks the equation list in registration order, evaluating
//! each right-hand side from already-replayed values (falling back to
//! recorded checkpoints) and solving the equation's block. The adjoint sweep
//! walks the list backwards, solving each block's hermitian system for the
//! adjoint variable and scattering derivative actions onto earlier
//! dependencies.
//!
//! # Determinism
//! Both sweeps are pure functions of the tape, the recorded values and the
//! pinned overrides; replaying twice yields identical states.

pub mod functional;

pub use functional::{FnFunctional, Functional};

use crate::backend::value::AdjointValue;
use crate::tape::adjointer::Adjointer;
use crate::tape::rhs::Direction;
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;
use log::debug;

/// Values per variable produced by a replay sweep.
#[derive(Clone, Debug)]
pub struct ReplayState<V> {
    values: hashbrown::HashMap<Variable, V>,
}

impl<V> Default for ReplayState<V> {
    fn default() -> Self {
        ReplayState {
            values: hashbrown::HashMap::new(),
        }
    }
}

impl<V: AdjointValue> ReplayState<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: Variable, value: V) -> Option<V> {
        self.values.insert(var, value)
    }

    pub fn get(&self, var: &Variable) -> Option<&V> {
        self.values.get(var)
    }

    /// Like [`ReplayState::get`] but missing variables are an error.
    pub fn try_get(&self, var: &Variable) -> Result<&V, TapeError> {
        self.values
            .get(var)
            .ok_or_else(|| TapeError::VariableNotRecorded(var.clone()))
    }

    pub fn contains(&self, var: &Variable) -> bool {
        self.values.contains_key(var)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &V)> {
        self.values.iter()
    }
}

impl<V: AdjointValue> FromIterator<(Variable, V)> for ReplayState<V> {
    fn from_iter<T: IntoIterator<Item = (Variable, V)>>(iter: T) -> Self {
        ReplayState {
            values: iter.into_iter().collect(),
        }
    }
}

/// Replay the tape forward and return every variable's recomputed value.
///
/// `pinned` substitutes values for chosen targets: a pinned equation is not
/// evaluated, its target takes the pinned value. This is how a reduced
/// functional re-solves the model at new control values without touching
/// the tape.
///
/// Dependency values come from the state built so far, then from recorded
/// checkpoints.
///
/// # Complexity
/// One right-hand-side evaluation and one block solve per equation.
pub fn replay_forward<V: AdjointValue>(
    adjointer: &Adjointer<V>,
    pinned: &ReplayState<V>,
) -> Result<ReplayState<V>, TapeError> {
    let mut state = ReplayState::new();
    for (index, eq) in adjointer.equations().iter().enumerate() {
        let target = eq.target();
        if let Some(value) = pinned.get(target) {
            debug!("replay: equation #{index} pinned for `{target}`");
            state.insert(target.clone(), value.clone());
            continue;
        }
        let deps = eq.rhs().dependencies();
        let mut values = Vec::with_capacity(deps.len());
        for dep in &deps {
            let v = match state.get(dep) {
                Some(v) => v.clone(),
                None => adjointer.recorded(dep)?,
            };
            values.push(v);
        }
        let b = eq.rhs().evaluate(&values)?;
        let assembled = eq.single_block()?.assemble(false, 1.0)?;
        let mut total = assembled.addend().clone();
        total.axpy(1.0, &b)?;
        let solution = assembled.operator().solve(&total)?;
        state.insert(target.clone(), solution);
    }
    Ok(state)
}

/// Sweep the tape backwards and return the adjoint variable of every
/// equation target.
///
/// For equation `i` with target `u_i`, the adjoint solve is
/// `A_i* lambda_i = dJ/du_i + sum_j (d rhs_j / d u_i)* lambda_j` over all
/// later equations `j` depending on `u_i`. The functional's gradient with
/// respect to an initial condition is that variable's adjoint.
///
/// # Errors
/// Propagates [`TapeError::NotImplemented`] when the sweep needs a
/// derivative action a recorded right-hand side does not declare, e.g. the
/// hermitian action of an interpolation or any action of a point-integral
/// step.
pub fn replay_adjoint<V, F>(
    adjointer: &Adjointer<V>,
    functional: &F,
    state: &ReplayState<V>,
) -> Result<ReplayState<V>, TapeError>
where
    V: AdjointValue,
    F: Functional<V> + ?Sized,
{
    let mut adjoints = ReplayState::new();
    let mut pending: hashbrown::HashMap<Variable, V> = hashbrown::HashMap::new();

    for (index, eq) in adjointer.equations().iter().enumerate().rev() {
        let target = eq.target();
        let mut rhs_total = functional.derivative(target, state)?;
        if let Some(accumulated) = pending.remove(target) {
            match rhs_total.as_mut() {
                Some(total) => total.axpy(1.0, &accumulated)?,
                None => rhs_total = Some(accumulated),
            }
        }
        let total = match rhs_total {
            Some(total) => total,
            None => state.try_get(target)?.zero_like(),
        };
        let assembled = eq.single_block()?.assemble(true, 1.0)?;
        let lambda = assembled.operator().solve_hermitian(&total)?;
        debug!("adjoint: equation #{index} solved for `{target}`");

        let deps = eq.rhs().dependencies();
        if !deps.is_empty() {
            let mut values = Vec::with_capacity(deps.len());
            for dep in &deps {
                values.push(state.try_get(dep)?.clone());
            }
            for dep in &deps {
                let contribution =
                    eq.rhs()
                        .derivative_action(&values, dep, &lambda, Direction::Hermitian)?;
                match pending.get_mut(dep) {
                    Some(acc) => acc.axpy(1.0, &contribution)?,
                    None => {
                        pending.insert(dep.clone(), contribution);
                    }
                }
            }
        }
        adjoints.insert(target.clone(), lambda);
    }
    Ok(adjoints)
}
