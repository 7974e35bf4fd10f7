//! Point-integral solver shim.
//!
//! Wraps a backend [`SchemeStepper`] and annotates every step as one tape
//! equation. The recorded right-hand side re-runs the step from captured
//! parameters, so replay reproduces the forward trajectory, but no
//! derivative action is declared for it.

use crate::annotate::{identity_block, register_initial_conditions, to_annotate};
use crate::backend::space::FunctionSpace;
use crate::backend::value::{AdjointValue, SchemeStepper};
use crate::tape::adjointer::Adjointer;
use crate::tape::checkpoint::RecordedValue;
use crate::tape::equation::Equation;
use crate::tape::rhs::PointIntegralStepRhs;
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;
use log::debug;
use std::sync::Arc;

/// Stepping shim around a scheme: owns the running solution, the scheme's
/// coefficient fields and the current time.
///
/// The solution must itself appear among the coefficients (matched by field
/// name); annotating a scheme where it does not is unsupported.
#[derive(Debug)]
pub struct PointIntegralSolver<V, S, P> {
    stepper: Arc<P>,
    space: S,
    solution: V,
    coefficients: Vec<V>,
    time: f64,
}

impl<V, S, P> PointIntegralSolver<V, S, P>
where
    V: AdjointValue,
    S: FunctionSpace,
    P: SchemeStepper<V>,
{
    pub fn new(stepper: P, space: S, solution: V, coefficients: Vec<V>, time: f64) -> Self {
        PointIntegralSolver {
            stepper: Arc::new(stepper),
            space,
            solution,
            coefficients,
            time,
        }
    }

    #[inline]
    pub fn solution(&self) -> &V {
        &self.solution
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn coefficients(&self) -> &[V] {
        &self.coefficients
    }

    /// Advance the solution by `dt`, annotating the step unless the flag or
    /// the tape's switch says otherwise.
    ///
    /// Order matters: the equation is registered before the step runs, and
    /// checkpointing plus record-all recording happen after it, against the
    /// post-step solution.
    pub fn step(
        &mut self,
        adjointer: &mut Adjointer<V>,
        dt: f64,
        annotate: Option<bool>,
    ) -> Result<(), TapeError> {
        let to_ann = to_annotate(annotate, adjointer);

        // refresh the solution's slot among the coefficients before stepping
        let ic_position = self
            .coefficients
            .iter()
            .position(|c| c.name() == self.solution.name());
        if let Some(ic) = ic_position {
            self.coefficients[ic].assign(&self.solution)?;
        }

        let mut pending = None;
        if to_ann {
            let ic_index = ic_position.ok_or(TapeError::NotImplemented(
                "point-integral scheme whose solution is not a coefficient of its right-hand side",
            ))?;
            let names: Vec<String> = self
                .coefficients
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let deps: Vec<Variable> = names
                .iter()
                .map(|n| adjointer.registry_mut().current(n))
                .collect();
            register_initial_conditions(
                adjointer,
                deps.iter().cloned().zip(self.coefficients.iter().cloned()),
            )?;
            let rhs = PointIntegralStepRhs::new(
                Arc::clone(&self.stepper),
                deps,
                self.coefficients.clone(),
                ic_index,
                self.time,
                dt,
            )?;
            let block = identity_block(self.space.name(), self.solution.zero_like());
            let next_var = adjointer.registry_mut().next(self.solution.name());
            debug!("annotating point-integral step to `{next_var}` at t={}", self.time);
            let equation = Equation::new(next_var.clone(), vec![Box::new(block)], Box::new(rhs))?;
            let action = adjointer.register_equation(equation)?;
            pending = Some((action, next_var));
        }

        self.solution = self
            .stepper
            .step(&self.solution, &self.coefficients, self.time, dt)?;
        self.time += dt;

        if let Some((action, next_var)) = pending {
            adjointer.do_checkpoint(action, &next_var)?;
            if adjointer.record_all() {
                adjointer.record_variable(next_var, RecordedValue::Memory(self.solution.clone()));
            }
        }
        Ok(())
    }
}
