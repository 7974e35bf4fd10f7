//! Dense serial reference backend.
//!
//! [`DenseField`] stores its coefficients in a flat `Vec<f64>` and implements
//! every backend trait the tape needs. It exists to exercise the tape, the
//! replay machinery and the optimizer adapter without linking a PDE library;
//! real backends wire their own field types to the same traits.

use crate::backend::space::FunctionSpace;
use crate::backend::value::{AdjointValue, Interpolate};
use crate::tape_error::TapeError;
use serde::{Deserialize, Serialize};

/// A named function space of fixed dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DenseSpace {
    name: String,
    dim: usize,
}

impl DenseSpace {
    pub fn new(name: impl Into<String>, dim: usize) -> Self {
        DenseSpace {
            name: name.into(),
            dim,
        }
    }
}

impl FunctionSpace for DenseSpace {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn dim(&self) -> usize {
        self.dim
    }
}

/// A dense coefficient vector over a [`DenseSpace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseField {
    name: String,
    space: DenseSpace,
    data: Vec<f64>,
}

impl DenseField {
    /// Zero field over `space`.
    pub fn zeros(name: impl Into<String>, space: &DenseSpace) -> Self {
        DenseField {
            name: name.into(),
            space: space.clone(),
            data: vec![0.0; space.dim()],
        }
    }

    /// Field with the given coefficients.
    ///
    /// # Errors
    /// Fails when `values` does not match the space dimension.
    pub fn from_values(
        name: impl Into<String>,
        space: &DenseSpace,
        values: Vec<f64>,
    ) -> Result<Self, TapeError> {
        if values.len() != space.dim() {
            return Err(TapeError::DimensionMismatch {
                expected: space.dim(),
                found: values.len(),
            });
        }
        Ok(DenseField {
            name: name.into(),
            space: space.clone(),
            data: values,
        })
    }

    #[inline]
    pub fn space(&self) -> &DenseSpace {
        &self.space
    }

    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn check_len(&self, other: &Self) -> Result<(), TapeError> {
        if self.data.len() != other.data.len() {
            return Err(TapeError::DimensionMismatch {
                expected: self.data.len(),
                found: other.data.len(),
            });
        }
        Ok(())
    }
}

impl AdjointValue for DenseField {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    fn zero_like(&self) -> Self {
        DenseField {
            name: self.name.clone(),
            space: self.space.clone(),
            data: vec![0.0; self.data.len()],
        }
    }

    fn assign(&mut self, other: &Self) -> Result<(), TapeError> {
        self.check_len(other)?;
        self.data.clone_from(&other.data);
        Ok(())
    }

    fn axpy(&mut self, alpha: f64, x: &Self) -> Result<(), TapeError> {
        self.check_len(x)?;
        for (a, b) in self.data.iter_mut().zip(&x.data) {
            *a += alpha * b;
        }
        Ok(())
    }

    fn scale(&mut self, alpha: f64) {
        for a in &mut self.data {
            *a *= alpha;
        }
    }

    fn dot(&self, other: &Self) -> Result<f64, TapeError> {
        self.check_len(other)?;
        Ok(self.data.iter().zip(&other.data).map(|(a, b)| a * b).sum())
    }

    fn local_values(&self) -> Vec<f64> {
        self.data.clone()
    }

    fn set_local_values(&mut self, values: &[f64]) -> Result<(), TapeError> {
        if values.len() != self.data.len() {
            return Err(TapeError::DimensionMismatch {
                expected: self.data.len(),
                found: values.len(),
            });
        }
        self.data.copy_from_slice(values);
        Ok(())
    }
}

/// Piecewise-linear resampling between dense spaces.
///
/// Matching dimensions copy; otherwise the source coefficients are treated
/// as nodal values on a uniform grid and sampled at the target's nodes. Both
/// paths are linear in the source, as [`Interpolate`] requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DenseInterpolator;

impl Interpolate<DenseField> for DenseInterpolator {
    type Space = DenseSpace;

    fn interpolate(&self, value: &DenseField, target: &DenseSpace) -> Result<DenseField, TapeError> {
        let n = value.len();
        let m = target.dim();
        if n == 0 && m > 0 {
            return Err(TapeError::DimensionMismatch {
                expected: m,
                found: 0,
            });
        }
        let out_name = format!("{}@{}", value.name(), target.name());
        let data = if n == m {
            value.data.clone()
        } else {
            let src = &value.data;
            (0..m)
                .map(|i| {
                    let pos = if m <= 1 {
                        0.0
                    } else {
                        i as f64 * (n - 1) as f64 / (m - 1) as f64
                    };
                    let k = pos.floor() as usize;
                    let frac = pos - k as f64;
                    if k + 1 < n {
                        src[k] * (1.0 - frac) + src[k + 1] * frac
                    } else {
                        src[n - 1]
                    }
                })
                .collect()
        };
        DenseField::from_values(out_name, target, data)
    }
}
