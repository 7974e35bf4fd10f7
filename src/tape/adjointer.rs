//! The adjointer: an append-only tape of recorded equations.
//!
//! Every annotated solve registers exactly one [`Equation`]. The tape keeps
//! equations in registration order and enforces the backward-only dependency
//! rule: a right-hand side may only reference variables that are already the
//! target of an earlier equation. Replay walks the list forward to recompute
//! values and backward to accumulate adjoints.
//!
//! # Invariants
//! - `targets[v] = i` iff `equations[i].target() == v`.
//! - Every dependency of `equations[i]` is the target of some `equations[j]`
//!   with `j < i`.
//! - `actions.len() == equations.len()`.

use crate::backend::value::AdjointValue;
use crate::debug_invariants::DebugInvariants;
use crate::tape::checkpoint::{
    self, CheckpointAction, CheckpointStrategy, RecordedValue,
};
use crate::tape::equation::Equation;
use crate::tape::variable::{Variable, VariableRegistry};
use crate::tape_error::TapeError;
use log::debug;

/// The tape. One per forward model; see [`Adjointer::reset`] for reuse
/// between independent runs.
#[derive(Debug)]
pub struct Adjointer<V: AdjointValue> {
    equations: Vec<Equation<V>>,
    targets: hashbrown::HashMap<Variable, usize>,
    registry: VariableRegistry,
    recorded: hashbrown::HashMap<Variable, RecordedValue<V>>,
    actions: Vec<CheckpointAction>,
    strategy: CheckpointStrategy,
    annotation_enabled: bool,
    record_all: bool,
    first_solve: bool,
}

impl<V: AdjointValue> Default for Adjointer<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: AdjointValue> Adjointer<V> {
    /// Fresh tape with checkpointing disabled.
    pub fn new() -> Self {
        Self::with_strategy(CheckpointStrategy::Disabled)
    }

    /// Fresh tape with the given checkpoint strategy.
    pub fn with_strategy(strategy: CheckpointStrategy) -> Self {
        Adjointer {
            equations: Vec::new(),
            targets: hashbrown::HashMap::new(),
            registry: VariableRegistry::new(),
            recorded: hashbrown::HashMap::new(),
            actions: Vec::new(),
            strategy,
            annotation_enabled: true,
            record_all: false,
            first_solve: true,
        }
    }

    #[inline]
    pub fn strategy(&self) -> &CheckpointStrategy {
        &self.strategy
    }

    #[inline]
    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    #[inline]
    pub fn registry_mut(&mut self) -> &mut VariableRegistry {
        &mut self.registry
    }

    /// Whether annotation is currently switched on for this tape.
    #[inline]
    pub fn annotation_enabled(&self) -> bool {
        self.annotation_enabled
    }

    /// Stop recording until [`Adjointer::continue_annotation`].
    pub fn pause_annotation(&mut self) {
        self.annotation_enabled = false;
    }

    /// Resume recording after [`Adjointer::pause_annotation`].
    pub fn continue_annotation(&mut self) {
        self.annotation_enabled = true;
    }

    /// Whether every annotated value is also recorded for replay checks.
    #[inline]
    pub fn record_all(&self) -> bool {
        self.record_all
    }

    pub fn set_record_all(&mut self, record_all: bool) {
        self.record_all = record_all;
    }

    /// True until the first annotated solve completes.
    #[inline]
    pub fn first_solve(&self) -> bool {
        self.first_solve
    }

    /// Finish the first-solve bookkeeping.
    ///
    /// Runs at most once per tape lifetime: if this is still the first solve
    /// and it registered at least one new initial condition, the timestep
    /// advances so subsequent solves land in timestep 1.
    pub fn complete_first_solve(&mut self, newly_registered: usize) {
        if !self.first_solve {
            return;
        }
        self.first_solve = false;
        if newly_registered > 0 {
            debug!(
                "first solve registered {newly_registered} initial conditions; advancing timestep"
            );
            self.registry.advance_timestep();
        }
    }

    /// Whether `var` is the target of a registered equation.
    #[inline]
    pub fn variable_known(&self, var: &Variable) -> bool {
        self.targets.contains_key(var)
    }

    #[inline]
    pub fn equations(&self) -> &[Equation<V>] {
        &self.equations
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.equations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    /// Equation producing `target`, if registered.
    pub fn equation(&self, target: &Variable) -> Option<&Equation<V>> {
        self.targets.get(target).map(|&i| &self.equations[i])
    }

    /// Index of the equation producing `target`.
    pub fn equation_index(&self, target: &Variable) -> Option<usize> {
        self.targets.get(target).copied()
    }

    /// Checkpoint decision recorded for equation `index`.
    pub fn checkpoint_action(&self, index: usize) -> Option<CheckpointAction> {
        self.actions.get(index).copied()
    }

    /// Current global timestep.
    #[inline]
    pub fn timestep(&self) -> usize {
        self.registry.timestep()
    }

    /// Advance the global timestep.
    pub fn advance_timestep(&mut self) {
        self.registry.advance_timestep();
    }

    /// Append an equation to the tape.
    ///
    /// Returns the checkpoint action the strategy chose for this equation;
    /// callers hand it back to [`Adjointer::do_checkpoint`] once the forward
    /// solve has actually happened.
    ///
    /// # Errors
    /// - [`TapeError::UnknownVariable`] when a dependency is not yet the
    ///   target of an earlier equation.
    /// - [`TapeError::DuplicateEquation`] when the target already has one.
    pub fn register_equation(
        &mut self,
        equation: Equation<V>,
    ) -> Result<CheckpointAction, TapeError> {
        for dep in equation.rhs().dependencies() {
            if !self.targets.contains_key(&dep) {
                return Err(TapeError::UnknownVariable(dep));
            }
        }
        if let Some(&idx) = self.targets.get(equation.target()) {
            return Err(TapeError::DuplicateEquation(
                equation.target().clone(),
                idx,
            ));
        }
        let index = self.equations.len();
        let action = self.strategy.action_for(index);
        debug!(
            "registering equation #{index} for `{}` ({} dependencies)",
            equation.target(),
            equation.rhs().dependencies().len()
        );
        self.targets.insert(equation.target().clone(), index);
        self.equations.push(equation);
        self.actions.push(action);
        self.debug_assert_invariants();
        Ok(action)
    }

    /// Execute a checkpoint decision for the equation producing `target`:
    /// snapshot the dependency values the equation captured at annotation
    /// time. Already-recorded variables are left untouched.
    pub fn do_checkpoint(
        &mut self,
        action: CheckpointAction,
        target: &Variable,
    ) -> Result<(), TapeError> {
        if action == CheckpointAction::Nothing {
            return Ok(());
        }
        let idx = *self
            .targets
            .get(target)
            .ok_or_else(|| TapeError::UnknownVariable(target.clone()))?;
        let pairs: Vec<(Variable, V)> = {
            let rhs = self.equations[idx].rhs();
            rhs.dependencies()
                .into_iter()
                .zip(rhs.coefficient_values())
                .collect()
        };
        for (var, value) in pairs {
            if self.recorded.contains_key(&var) {
                continue;
            }
            let recorded = match action {
                CheckpointAction::Nothing => continue,
                CheckpointAction::Memory => RecordedValue::Memory(value),
                CheckpointAction::Disk => {
                    let path = self.strategy.disk_path(&var)?;
                    checkpoint::write_snapshot(&path, &value)?;
                    RecordedValue::Disk(path)
                }
            };
            debug!("checkpointed `{var}`");
            self.recorded.insert(var, recorded);
        }
        Ok(())
    }

    /// Record a value for `var`, e.g. under record-all mode. Overwrites any
    /// earlier recording of the same variable.
    pub fn record_variable(&mut self, var: Variable, value: RecordedValue<V>) {
        self.recorded.insert(var, value);
    }

    /// Whether a value is recorded for `var`.
    #[inline]
    pub fn has_recorded(&self, var: &Variable) -> bool {
        self.recorded.contains_key(var)
    }

    /// Materialize the recorded value of `var`.
    ///
    /// # Errors
    /// [`TapeError::VariableNotRecorded`] when nothing was recorded, or a
    /// [`TapeError::CheckpointIo`] when a disk snapshot cannot be read back.
    pub fn recorded(&self, var: &Variable) -> Result<V, TapeError> {
        self.recorded
            .get(var)
            .ok_or_else(|| TapeError::VariableNotRecorded(var.clone()))?
            .load()
    }

    /// Clear the tape for an independent run: equations, recordings and
    /// variable counters all go; annotation settings and the checkpoint
    /// strategy survive. Disk snapshots are deleted best-effort.
    pub fn reset(&mut self) {
        for rec in self.recorded.values() {
            if let RecordedValue::Disk(path) = rec {
                let _ = std::fs::remove_file(path);
            }
        }
        self.equations.clear();
        self.targets.clear();
        self.recorded.clear();
        self.actions.clear();
        self.registry.reset();
        self.first_solve = true;
        debug!("tape reset");
    }
}

impl<V: AdjointValue> DebugInvariants for Adjointer<V> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Adjointer");
    }

    fn validate_invariants(&self) -> Result<(), TapeError> {
        if self.actions.len() != self.equations.len() {
            return Err(TapeError::LayoutMismatch {
                expected: self.equations.len(),
                found: self.actions.len(),
            });
        }
        if self.targets.len() != self.equations.len() {
            return Err(TapeError::LayoutMismatch {
                expected: self.equations.len(),
                found: self.targets.len(),
            });
        }
        for (var, &idx) in &self.targets {
            if self.equations.get(idx).map(|eq| eq.target()) != Some(var) {
                return Err(TapeError::UnknownVariable(var.clone()));
            }
        }
        for (i, eq) in self.equations.iter().enumerate() {
            for dep in eq.rhs().dependencies() {
                match self.targets.get(&dep) {
                    Some(&j) if j < i => {}
                    _ => return Err(TapeError::UnknownVariable(dep)),
                }
            }
        }
        Ok(())
    }
}
