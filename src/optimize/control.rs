//! Controls and bounds for optimization problems.
//!
//! A control is either a distributed field or a replicated constant (scalar,
//! vector or row-major matrix). Both kinds flatten into the packed control
//! vector; constants are split across ranks the way PETSc's `DECIDE` sizing
//! splits them, so a run's layout is independent of the control mix.

use crate::backend::value::AdjointValue;
use crate::optimize::layout::decide_partition;
use crate::tape_error::TapeError;
use serde::{Deserialize, Serialize};

/// Value of a replicated constant control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Scalar(f64),
    Vector(Vec<f64>),
    /// Row-major matrix.
    Matrix {
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    },
}

impl ConstantValue {
    /// Build a matrix constant, validating the shape.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, TapeError> {
        if data.len() != rows * cols {
            return Err(TapeError::DimensionMismatch {
                expected: rows * cols,
                found: data.len(),
            });
        }
        Ok(ConstantValue::Matrix { rows, cols, data })
    }

    /// Number of flattened entries.
    pub fn flat_len(&self) -> usize {
        match self {
            ConstantValue::Scalar(_) => 1,
            ConstantValue::Vector(v) => v.len(),
            ConstantValue::Matrix { data, .. } => data.len(),
        }
    }

    /// Flatten into a row-major buffer.
    pub fn to_flat(&self) -> Vec<f64> {
        match self {
            ConstantValue::Scalar(s) => vec![*s],
            ConstantValue::Vector(v) => v.clone(),
            ConstantValue::Matrix { data, .. } => data.clone(),
        }
    }

    /// Rebuild a value of the same shape as `self` from a flat buffer.
    pub fn from_flat_like(&self, flat: &[f64]) -> Result<Self, TapeError> {
        if flat.len() != self.flat_len() {
            return Err(TapeError::DimensionMismatch {
                expected: self.flat_len(),
                found: flat.len(),
            });
        }
        Ok(match self {
            ConstantValue::Scalar(_) => ConstantValue::Scalar(flat[0]),
            ConstantValue::Vector(_) => ConstantValue::Vector(flat.to_vec()),
            ConstantValue::Matrix { rows, cols, .. } => ConstantValue::Matrix {
                rows: *rows,
                cols: *cols,
                data: flat.to_vec(),
            },
        })
    }
}

/// One optimization control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Control<V> {
    /// A distributed field; each rank holds its local part.
    Field(V),
    /// A named constant, replicated on every rank.
    Constant { name: String, value: ConstantValue },
}

impl<V: AdjointValue> Control<V> {
    pub fn constant(name: impl Into<String>, value: ConstantValue) -> Self {
        Control::Constant {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Control::Field(v) => v.name(),
            Control::Constant { name, .. } => name,
        }
    }

    /// This rank's share of the control in the packed vector.
    pub fn local_len(&self, rank: usize, size: usize) -> usize {
        match self {
            Control::Field(v) => v.len(),
            Control::Constant { value, .. } => decide_partition(value.flat_len(), rank, size).1,
        }
    }

    /// The field value, when this is a field control.
    ///
    /// # Errors
    /// [`TapeError::UnsupportedControl`] for constant controls.
    pub fn field(&self) -> Result<&V, TapeError> {
        match self {
            Control::Field(v) => Ok(v),
            Control::Constant { .. } => Err(TapeError::UnsupportedControl(
                "a field control is required here",
            )),
        }
    }
}

/// One side of a box constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue<V> {
    /// A constant bound, filled across the control's entries.
    Const(f64),
    /// A field bound matching a field control's layout.
    Field(V),
}

impl<V> From<f64> for BoundValue<V> {
    fn from(v: f64) -> Self {
        BoundValue::Const(v)
    }
}

impl<V> From<i32> for BoundValue<V> {
    fn from(v: i32) -> Self {
        BoundValue::Const(f64::from(v))
    }
}

/// Box constraints for one control.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds<V> {
    pub lower: BoundValue<V>,
    pub upper: BoundValue<V>,
}

impl<V> Bounds<V> {
    pub fn new(lower: impl Into<BoundValue<V>>, upper: impl Into<BoundValue<V>>) -> Self {
        Bounds {
            lower: lower.into(),
            upper: upper.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dense::{DenseField, DenseSpace};

    #[test]
    fn constant_flattening_roundtrip() {
        let m = ConstantValue::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(m.flat_len(), 6);
        let flat = m.to_flat();
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.from_flat_like(&flat).unwrap(), m);
        let s = ConstantValue::Scalar(0.5);
        assert_eq!(s.from_flat_like(&[2.5]).unwrap(), ConstantValue::Scalar(2.5));
    }

    #[test]
    fn matrix_shape_validated() {
        assert!(ConstantValue::matrix(2, 2, vec![1.0]).is_err());
        let s = ConstantValue::Scalar(1.0);
        assert!(s.from_flat_like(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn control_names_and_lengths() {
        let f = DenseField::zeros("m", &DenseSpace::new("M", 4));
        let c: Control<DenseField> = Control::Field(f);
        assert_eq!(c.name(), "m");
        assert_eq!(c.local_len(0, 1), 4);
        let k: Control<DenseField> =
            Control::constant("nu", ConstantValue::Vector(vec![1.0, 2.0, 3.0]));
        assert_eq!(k.name(), "nu");
        // three entries over two ranks: 2 then 1
        assert_eq!(k.local_len(0, 2), 2);
        assert_eq!(k.local_len(1, 2), 1);
        assert!(k.field().is_err());
    }

    #[test]
    fn bound_conversions() {
        let b: Bounds<DenseField> = Bounds::new(0.0, 1);
        assert_eq!(b.lower, BoundValue::Const(0.0));
        assert_eq!(b.upper, BoundValue::Const(1.0));
    }
}
