//! Right-hand sides of tape equations.
//!
//! A [`Rhs`] knows how to recompute its value from the values of its
//! dependencies, and optionally how to apply the derivative of that map in
//! the forward or hermitian direction. The set of right-hand sides the tape
//! records is closed: identity copies, captured initial values,
//! interpolations, and point-integral scheme steps.

use crate::backend::value::{AdjointValue, Interpolate, SchemeStepper};
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;
use std::fmt;
use std::sync::Arc;

/// Direction of a derivative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply the derivative operator itself.
    Forward,
    /// Apply its adjoint.
    Hermitian,
}

/// Right-hand side of a tape equation.
///
/// `values` arguments are always aligned with [`Rhs::dependencies`].
pub trait Rhs<V: AdjointValue>: Send + Sync + fmt::Debug {
    /// Recompute the right-hand side from dependency values.
    fn evaluate(&self, values: &[V]) -> Result<V, TapeError>;

    /// Apply the derivative of this right-hand side with respect to `wrt`
    /// to `contraction`.
    ///
    /// # Errors
    /// The default declares no derivative action at all; adjoint replay
    /// through such an equation reports [`TapeError::NotImplemented`].
    fn derivative_action(
        &self,
        values: &[V],
        wrt: &Variable,
        contraction: &V,
        direction: Direction,
    ) -> Result<V, TapeError> {
        let _ = (values, wrt, contraction, direction);
        Err(TapeError::NotImplemented(
            "derivative action for this right-hand side",
        ))
    }

    /// Variables this right-hand side reads, in evaluation order.
    fn dependencies(&self) -> Vec<Variable>;

    /// Current values of the dependencies, captured at annotation time and
    /// aligned with [`Rhs::dependencies`]. Checkpointing snapshots these.
    fn coefficient_values(&self) -> Vec<V>;
}

/// Identity right-hand side: the equation's value is a copy of one
/// dependency. Records assignments and renamed or retimed copies.
#[derive(Debug, Clone)]
pub struct IdentityRhs<V> {
    dependency: Variable,
    snapshot: V,
}

impl<V: AdjointValue> IdentityRhs<V> {
    pub fn new(dependency: Variable, snapshot: V) -> Self {
        IdentityRhs {
            dependency,
            snapshot,
        }
    }
}

impl<V: AdjointValue> Rhs<V> for IdentityRhs<V> {
    fn evaluate(&self, values: &[V]) -> Result<V, TapeError> {
        if values.len() != 1 {
            return Err(TapeError::LayoutMismatch {
                expected: 1,
                found: values.len(),
            });
        }
        Ok(values[0].clone())
    }

    fn derivative_action(
        &self,
        _values: &[V],
        wrt: &Variable,
        contraction: &V,
        _direction: Direction,
    ) -> Result<V, TapeError> {
        if wrt != &self.dependency {
            return Err(TapeError::UnknownVariable(wrt.clone()));
        }
        // the identity is its own adjoint
        Ok(contraction.clone())
    }

    fn dependencies(&self) -> Vec<Variable> {
        vec![self.dependency.clone()]
    }

    fn coefficient_values(&self) -> Vec<V> {
        vec![self.snapshot.clone()]
    }
}

/// Captured initial value: the equation's value is a constant taken at
/// registration time. Every initial-condition equation uses one of these.
#[derive(Debug, Clone)]
pub struct InitialValueRhs<V> {
    value: V,
}

impl<V: AdjointValue> InitialValueRhs<V> {
    pub fn new(value: V) -> Self {
        InitialValueRhs { value }
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }
}

impl<V: AdjointValue> Rhs<V> for InitialValueRhs<V> {
    fn evaluate(&self, values: &[V]) -> Result<V, TapeError> {
        if !values.is_empty() {
            return Err(TapeError::LayoutMismatch {
                expected: 0,
                found: values.len(),
            });
        }
        Ok(self.value.clone())
    }

    fn dependencies(&self) -> Vec<Variable> {
        Vec::new()
    }

    fn coefficient_values(&self) -> Vec<V> {
        Vec::new()
    }
}

/// Interpolation right-hand side: re-runs the backend interpolation of the
/// source field into the target space.
///
/// The forward derivative action of a (linear) interpolation is the same
/// interpolation applied to the direction. The hermitian action would need
/// the transpose operator, which no backend here provides, so it reports
/// [`TapeError::NotImplemented`].
#[derive(Debug, Clone)]
pub struct InterpolateRhs<V, I: Interpolate<V>>
where
    V: AdjointValue,
{
    interpolator: I,
    source: Variable,
    snapshot: V,
    space: I::Space,
}

impl<V: AdjointValue, I: Interpolate<V>> InterpolateRhs<V, I> {
    pub fn new(interpolator: I, source: Variable, snapshot: V, space: I::Space) -> Self {
        InterpolateRhs {
            interpolator,
            source,
            snapshot,
            space,
        }
    }

    #[inline]
    pub fn space(&self) -> &I::Space {
        &self.space
    }
}

impl<V: AdjointValue, I: Interpolate<V>> Rhs<V> for InterpolateRhs<V, I> {
    fn evaluate(&self, values: &[V]) -> Result<V, TapeError> {
        if values.len() != 1 {
            return Err(TapeError::LayoutMismatch {
                expected: 1,
                found: values.len(),
            });
        }
        self.interpolator.interpolate(&values[0], &self.space)
    }

    fn derivative_action(
        &self,
        _values: &[V],
        wrt: &Variable,
        contraction: &V,
        direction: Direction,
    ) -> Result<V, TapeError> {
        if wrt != &self.source {
            return Err(TapeError::UnknownVariable(wrt.clone()));
        }
        match direction {
            Direction::Forward => self.interpolator.interpolate(contraction, &self.space),
            Direction::Hermitian => Err(TapeError::NotImplemented(
                "hermitian action of an interpolation operator",
            )),
        }
    }

    fn dependencies(&self) -> Vec<Variable> {
        vec![self.source.clone()]
    }

    fn coefficient_values(&self) -> Vec<V> {
        vec![self.snapshot.clone()]
    }
}

/// One step of a point-integral scheme, recorded as a pure recomputation.
///
/// The step is re-run from the captured stepper, start time and step size,
/// with the dependency values substituted for the scheme's coefficients.
/// No derivative action is declared; differentiating through a scheme step
/// is done by assembling its residual outside the tape.
#[derive(Debug)]
pub struct PointIntegralStepRhs<V, P> {
    stepper: Arc<P>,
    dependencies: Vec<Variable>,
    snapshots: Vec<V>,
    ic_index: usize,
    time: f64,
    dt: f64,
}

impl<V: AdjointValue, P: SchemeStepper<V>> PointIntegralStepRhs<V, P> {
    /// Capture one scheme step.
    ///
    /// `ic_index` locates the scheme's solution among the dependencies.
    pub fn new(
        stepper: Arc<P>,
        dependencies: Vec<Variable>,
        snapshots: Vec<V>,
        ic_index: usize,
        time: f64,
        dt: f64,
    ) -> Result<Self, TapeError> {
        if snapshots.len() != dependencies.len() {
            return Err(TapeError::LayoutMismatch {
                expected: dependencies.len(),
                found: snapshots.len(),
            });
        }
        if ic_index >= dependencies.len() {
            return Err(TapeError::LayoutMismatch {
                expected: dependencies.len(),
                found: ic_index,
            });
        }
        Ok(PointIntegralStepRhs {
            stepper,
            dependencies,
            snapshots,
            ic_index,
            time,
            dt,
        })
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn dt(&self) -> f64 {
        self.dt
    }
}

impl<V: AdjointValue, P: SchemeStepper<V>> Rhs<V> for PointIntegralStepRhs<V, P> {
    fn evaluate(&self, values: &[V]) -> Result<V, TapeError> {
        if values.len() != self.dependencies.len() {
            return Err(TapeError::LayoutMismatch {
                expected: self.dependencies.len(),
                found: values.len(),
            });
        }
        self.stepper
            .step(&values[self.ic_index], values, self.time, self.dt)
    }

    fn dependencies(&self) -> Vec<Variable> {
        self.dependencies.clone()
    }

    fn coefficient_values(&self) -> Vec<V> {
        self.snapshots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dense::{DenseField, DenseInterpolator, DenseSpace};

    fn field(name: &str, vals: &[f64]) -> DenseField {
        DenseField::from_values(name, &DenseSpace::new("S", vals.len()), vals.to_vec()).unwrap()
    }

    #[test]
    fn identity_rhs_copies_dependency() {
        let dep = Variable::new("v", 0, 0);
        let rhs = IdentityRhs::new(dep.clone(), field("v", &[1.0, 2.0]));
        let out = rhs.evaluate(&[field("v", &[3.0, 4.0])]).unwrap();
        assert_eq!(out.local_values(), vec![3.0, 4.0]);
        // both derivative directions are the identity
        let dir = field("d", &[1.0, 0.0]);
        for d in [Direction::Forward, Direction::Hermitian] {
            let a = rhs.derivative_action(&[], &dep, &dir, d).unwrap();
            assert_eq!(a.local_values(), vec![1.0, 0.0]);
        }
    }

    #[test]
    fn identity_rhs_rejects_foreign_variable() {
        let dep = Variable::new("v", 0, 0);
        let rhs = IdentityRhs::new(dep, field("v", &[1.0]));
        let err = rhs
            .derivative_action(
                &[],
                &Variable::new("w", 0, 0),
                &field("d", &[1.0]),
                Direction::Forward,
            )
            .unwrap_err();
        assert!(matches!(err, TapeError::UnknownVariable(_)));
    }

    #[test]
    fn initial_value_rhs_is_constant() {
        let rhs = InitialValueRhs::new(field("m", &[5.0]));
        assert!(rhs.dependencies().is_empty());
        assert_eq!(rhs.evaluate(&[]).unwrap().local_values(), vec![5.0]);
        assert!(matches!(
            rhs.evaluate(&[field("x", &[1.0])]),
            Err(TapeError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn default_derivative_action_is_not_implemented() {
        let rhs = InitialValueRhs::new(field("m", &[5.0]));
        let err = rhs
            .derivative_action(
                &[],
                &Variable::new("m", 0, 0),
                &field("d", &[1.0]),
                Direction::Hermitian,
            )
            .unwrap_err();
        assert!(matches!(err, TapeError::NotImplemented(_)));
    }

    #[test]
    fn interpolate_rhs_hermitian_unsupported() {
        let src = Variable::new("v", 0, 0);
        let space = DenseSpace::new("W", 2);
        let rhs = InterpolateRhs::new(
            DenseInterpolator,
            src.clone(),
            field("v", &[1.0, 2.0]),
            space,
        );
        let c = field("c", &[1.0, 1.0]);
        assert!(rhs
            .derivative_action(&[], &src, &c, Direction::Forward)
            .is_ok());
        assert!(matches!(
            rhs.derivative_action(&[], &src, &c, Direction::Hermitian),
            Err(TapeError::NotImplemented(_))
        ));
    }
}
