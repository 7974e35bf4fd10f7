//! Reduced functionals: the quantity of interest as a function of controls.
//!
//! A reduced functional hides the forward model behind `J(m)`: evaluating it
//! re-solves the model at new control values, and its derivative is the
//! gradient an optimizer consumes. [`TapeReducedFunctional`] realizes this on
//! an annotated tape by pinning the control's initial-condition variable and
//! replaying.

use crate::backend::value::AdjointValue;
use crate::optimize::control::Control;
use crate::replay::{Functional, ReplayState, replay_adjoint, replay_forward};
use crate::tape::adjointer::Adjointer;
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;
use log::debug;

/// A scalar functional reduced over a set of controls.
///
/// `evaluate` moves the functional to a new control point; `derivative` and
/// `hessian_action` refer to the most recent point.
pub trait ReducedFunctional<V: AdjointValue>: Send + Sync {
    /// Controls at the current evaluation point.
    fn controls(&self) -> &[Control<V>];

    /// Re-solve the model at `controls` and return the functional value.
    fn evaluate(&mut self, controls: &[Control<V>]) -> Result<f64, TapeError>;

    /// Gradient with respect to each control at the last evaluation point.
    ///
    /// # Errors
    /// [`TapeError::NotYetEvaluated`] before the first [`Self::evaluate`].
    fn derivative(&mut self) -> Result<Vec<Control<V>>, TapeError>;

    /// Hessian applied to `directions` at the last evaluation point.
    fn hessian_action(&mut self, directions: &[Control<V>])
    -> Result<Vec<Control<V>>, TapeError>;
}

/// Reduced functional backed by tape replay.
///
/// Scoped to a single field control: the control values are pinned onto the
/// control's first tape variable (its initial condition), the tape is
/// replayed forward for the value and backwards for the gradient. The
/// Hessian action is a forward-difference of gradients, exact for quadratic
/// functionals.
pub struct TapeReducedFunctional<'a, V: AdjointValue, F> {
    adjointer: &'a Adjointer<V>,
    functional: F,
    control_var: Variable,
    controls: Vec<Control<V>>,
    last_state: Option<ReplayState<V>>,
    last_value: Option<f64>,
    last_gradient: Option<V>,
}

impl<'a, V, F> TapeReducedFunctional<'a, V, F>
where
    V: AdjointValue,
    F: Functional<V>,
{
    /// Reduce `functional` over the field `control`.
    ///
    /// # Errors
    /// [`TapeError::UnknownVariable`] when no equation on the tape targets a
    /// variable named after `control`.
    pub fn new(adjointer: &'a Adjointer<V>, functional: F, control: V) -> Result<Self, TapeError> {
        let control_var = adjointer
            .equations()
            .iter()
            .map(|eq| eq.target())
            .find(|target| target.name() == control.name())
            .cloned()
            .ok_or_else(|| TapeError::UnknownVariable(Variable::new(control.name(), 0, 0)))?;
        Ok(TapeReducedFunctional {
            adjointer,
            functional,
            control_var,
            controls: vec![Control::Field(control)],
            last_state: None,
            last_value: None,
            last_gradient: None,
        })
    }

    /// The tape variable control values are pinned to.
    #[inline]
    pub fn control_variable(&self) -> &Variable {
        &self.control_var
    }

    /// Value at the last evaluation point, if any.
    #[inline]
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    fn single_field<'c>(&self, controls: &'c [Control<V>]) -> Result<&'c V, TapeError> {
        if controls.len() != 1 {
            return Err(TapeError::MultipleControlsUnsupported(controls.len()));
        }
        controls[0].field()
    }

    fn gradient_field(&mut self) -> Result<V, TapeError> {
        if let Some(g) = &self.last_gradient {
            return Ok(g.clone());
        }
        let state = self.last_state.as_ref().ok_or(TapeError::NotYetEvaluated)?;
        let adjoints = replay_adjoint(self.adjointer, &self.functional, state)?;
        let gradient = match adjoints.get(&self.control_var) {
            Some(g) => g.clone(),
            None => self.controls[0].field()?.zero_like(),
        };
        self.last_gradient = Some(gradient.clone());
        Ok(gradient)
    }
}

impl<'a, V, F> ReducedFunctional<V> for TapeReducedFunctional<'a, V, F>
where
    V: AdjointValue,
    F: Functional<V>,
{
    fn controls(&self) -> &[Control<V>] {
        &self.controls
    }

    fn evaluate(&mut self, controls: &[Control<V>]) -> Result<f64, TapeError> {
        let field = self.single_field(controls)?;
        let pinned: ReplayState<V> =
            [(self.control_var.clone(), field.clone())].into_iter().collect();
        let state = replay_forward(self.adjointer, &pinned)?;
        let value = self.functional.value(&state)?;
        debug!("reduced functional evaluated to {value} at `{}`", self.control_var);
        self.controls = controls.to_vec();
        self.last_state = Some(state);
        self.last_value = Some(value);
        self.last_gradient = None;
        Ok(value)
    }

    fn derivative(&mut self) -> Result<Vec<Control<V>>, TapeError> {
        let gradient = self.gradient_field()?;
        Ok(vec![Control::Field(gradient)])
    }

    fn hessian_action(
        &mut self,
        directions: &[Control<V>],
    ) -> Result<Vec<Control<V>>, TapeError> {
        let direction = self.single_field(directions)?.clone();
        let base = self.single_field(&self.controls)?.clone();
        if self.last_state.is_none() {
            return Err(TapeError::NotYetEvaluated);
        }
        let d_norm = direction.norm()?;
        if d_norm == 0.0 {
            return Ok(vec![Control::Field(base.zero_like())]);
        }
        let base_gradient = self.gradient_field()?;

        // forward difference of gradients along the direction
        let eps = f64::EPSILON.sqrt() * (1.0 + base.norm()?) / d_norm;
        let mut shifted = base.clone();
        shifted.axpy(eps, &direction)?;
        self.evaluate(&[Control::Field(shifted)])?;
        let mut action = self.gradient_field()?;
        action.axpy(-1.0, &base_gradient)?;
        action.scale(1.0 / eps);

        // move back to the original point, keeping its gradient cached
        self.evaluate(&[Control::Field(base)])?;
        self.last_gradient = Some(base_gradient);
        Ok(vec![Control::Field(action)])
    }
}
