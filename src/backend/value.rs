//! Value-side backend traits.
//!
//! The tape is generic over the field type a backend solves for. A backend
//! supplies vector-space arithmetic through [`AdjointValue`], interpolation
//! between spaces through [`Interpolate`], and point-integral scheme steps
//! through [`SchemeStepper`]. The dense reference backend lives in
//! [`crate::backend::dense`].

use crate::backend::space::FunctionSpace;
use crate::tape_error::TapeError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

/// A field value the tape can snapshot, replay and differentiate through.
///
/// Lengths are rank-local degree-of-freedom counts. Serde bounds exist so
/// disk checkpoints can park any backend value as bincode.
pub trait AdjointValue:
    Clone + PartialEq + Send + Sync + fmt::Debug + Serialize + DeserializeOwned + 'static
{
    /// Field name; variable identities on the tape are keyed by it.
    fn name(&self) -> &str;

    /// Rank-local degree-of-freedom count.
    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A zero value with the same shape (and name) as `self`.
    fn zero_like(&self) -> Self;

    /// Copy `other`'s data into `self`, keeping `self`'s identity.
    fn assign(&mut self, other: &Self) -> Result<(), TapeError>;

    /// `self += alpha * x`.
    fn axpy(&mut self, alpha: f64, x: &Self) -> Result<(), TapeError>;

    /// `self *= alpha`.
    fn scale(&mut self, alpha: f64);

    /// Inner product with `other`.
    fn dot(&self, other: &Self) -> Result<f64, TapeError>;

    /// Rank-local values as a flat buffer, in dof order.
    fn local_values(&self) -> Vec<f64>;

    /// Overwrite the rank-local values from a flat buffer.
    fn set_local_values(&mut self, values: &[f64]) -> Result<(), TapeError>;

    /// Euclidean norm.
    fn norm(&self) -> Result<f64, TapeError> {
        Ok(self.dot(self)?.sqrt())
    }
}

/// Backend interpolation of a value into a target function space.
pub trait Interpolate<V: AdjointValue>: Clone + Send + Sync + fmt::Debug + 'static {
    type Space: FunctionSpace;

    /// Interpolate `value` into `target`. Must be linear in `value` so the
    /// forward derivative action of a recorded interpolation is itself an
    /// interpolation of the direction.
    fn interpolate(&self, value: &V, target: &Self::Space) -> Result<V, TapeError>;
}

/// One step of a point-integral scheme, as a pure function.
///
/// # Determinism
/// `step` must depend only on its arguments and the stepper's own frozen
/// parameters; replay calls it again with recorded inputs and expects the
/// original output.
pub trait SchemeStepper<V: AdjointValue>: Send + Sync + fmt::Debug + 'static {
    /// Advance `initial` by `dt` starting at `time`, with `coefficients`
    /// substituted for the scheme's coefficient fields.
    fn step(&self, initial: &V, coefficients: &[V], time: f64, dt: f64) -> Result<V, TapeError>;
}

/// Closure-backed [`SchemeStepper`], mainly for tests and small models.
pub struct FnStepper<V, F> {
    f: F,
    _marker: PhantomData<fn(&V) -> V>,
}

impl<V, F> FnStepper<V, F>
where
    V: AdjointValue,
    F: Fn(&V, &[V], f64, f64) -> Result<V, TapeError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        FnStepper {
            f,
            _marker: PhantomData,
        }
    }
}

impl<V, F> fmt::Debug for FnStepper<V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnStepper")
    }
}

impl<V, F> SchemeStepper<V> for FnStepper<V, F>
where
    V: AdjointValue,
    F: Fn(&V, &[V], f64, f64) -> Result<V, TapeError> + Send + Sync + 'static,
{
    fn step(&self, initial: &V, coefficients: &[V], time: f64, dt: f64) -> Result<V, TapeError> {
        (self.f)(initial, coefficients, time, dt)
    }
}
