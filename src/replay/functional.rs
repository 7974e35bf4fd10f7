//! Scalar functionals of a replayed forward state.

use crate::backend::value::AdjointValue;
use crate::replay::ReplayState;
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;
use std::fmt;

/// A scalar quantity of interest over the forward state, with its partial
/// derivatives with respect to individual tape variables.
pub trait Functional<V: AdjointValue>: Send + Sync {
    /// Evaluate the functional on a replayed state.
    fn value(&self, state: &ReplayState<V>) -> Result<f64, TapeError>;

    /// Partial derivative with respect to `var`, or `None` when the
    /// functional does not directly depend on it.
    fn derivative(&self, var: &Variable, state: &ReplayState<V>)
    -> Result<Option<V>, TapeError>;
}

type ValueFn<V> = Box<dyn Fn(&ReplayState<V>) -> Result<f64, TapeError> + Send + Sync>;
type DerivativeFn<V> =
    Box<dyn Fn(&Variable, &ReplayState<V>) -> Result<Option<V>, TapeError> + Send + Sync>;

/// Closure-backed [`Functional`].
pub struct FnFunctional<V> {
    name: String,
    value: ValueFn<V>,
    derivative: DerivativeFn<V>,
}

impl<V: AdjointValue> FnFunctional<V> {
    pub fn new(
        name: impl Into<String>,
        value: impl Fn(&ReplayState<V>) -> Result<f64, TapeError> + Send + Sync + 'static,
        derivative: impl Fn(&Variable, &ReplayState<V>) -> Result<Option<V>, TapeError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        FnFunctional {
            name: name.into(),
            value: Box::new(value),
            derivative: Box::new(derivative),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V> fmt::Debug for FnFunctional<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunctional")
            .field("name", &self.name)
            .finish()
    }
}

impl<V: AdjointValue> Functional<V> for FnFunctional<V> {
    fn value(&self, state: &ReplayState<V>) -> Result<f64, TapeError> {
        (self.value)(state)
    }

    fn derivative(
        &self,
        var: &Variable,
        state: &ReplayState<V>,
    ) -> Result<Option<V>, TapeError> {
        (self.derivative)(var, state)
    }
}
