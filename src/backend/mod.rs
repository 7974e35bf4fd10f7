//! Backend seam: the traits a field backend implements to be taped.

pub mod dense;
pub mod space;
pub mod value;

pub use dense::{DenseField, DenseInterpolator, DenseSpace};
pub use space::FunctionSpace;
pub use value::{AdjointValue, FnStepper, Interpolate, SchemeStepper};
