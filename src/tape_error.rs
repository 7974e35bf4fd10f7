//! TapeError: Unified error type for adjoint-tape public APIs
//!
//! This error type is used throughout the adjoint-tape library to provide
//! robust, non-panicking error handling for all public APIs.

use crate::tape::variable::Variable;
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for adjoint-tape operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TapeError {
    /// A right-hand side depends on a variable no equation has produced yet.
    #[error("variable `{0}` is not known to the tape; register it as an initial condition first")]
    UnknownVariable(Variable),
    /// Two equations were registered for the same target variable.
    #[error("variable `{0}` is already the target of equation #{1}")]
    DuplicateEquation(Variable, usize),
    /// An equation was registered with an empty block list.
    #[error("equation for `{0}` has no blocks")]
    EmptyEquation(Variable),
    /// A value was requested that was never recorded on the tape.
    #[error("no recorded value for variable `{0}`")]
    VariableNotRecorded(Variable),
    /// The operation is outside the closed set the tape supports.
    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),
    /// The control kind cannot be used in this position.
    #[error("unsupported control: {0}")]
    UnsupportedControl(&'static str),
    /// A bound does not fit the control it was given for.
    #[error("unsupported bound for control `{name}`: {reason}")]
    UnsupportedBound { name: String, reason: &'static str },
    /// General constraints are not supported by the TAO adapter.
    #[error("constraints are not supported by this solver adapter")]
    ConstraintsUnsupported,
    /// Derivative and Hessian evaluation is scoped to a single control.
    #[error("{0} controls supplied; derivative evaluation supports exactly one")]
    MultipleControlsUnsupported(usize),
    /// An optimization problem was built with no controls at all.
    #[error("optimization problem has no controls")]
    EmptyControls,
    /// A control contributes no entries on any rank.
    #[error("control #{0} has zero global length")]
    ZeroLengthControl(usize),
    /// No optimizer backend is linked into this build.
    #[error("no optimizer backend available: {0}")]
    MissingSolver(&'static str),
    /// A distributed vector was read between mutation and `assemble()`.
    #[error("global vector accessed before assemble()")]
    UnassembledVector,
    /// A write landed outside the caller's owner range.
    #[error("global index {index} outside this rank's owner range {start}..{end}")]
    IndexOutsideOwnerRange { index: u64, start: u64, end: u64 },
    /// Two packed objects disagree on their layout.
    #[error("layout mismatch: expected {expected} entries, found {found}")]
    LayoutMismatch { expected: usize, found: usize },
    /// Two values disagree on their dimension.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// A cached derivative or Hessian was requested before any evaluation.
    #[error("reduced functional queried before any evaluation")]
    NotYetEvaluated,
    /// Reading or writing a checkpoint file failed.
    #[error("checkpoint I/O failed: {0}")]
    CheckpointIo(String),
    /// A rank exchange produced inconsistent data.
    #[error("communication failed: {0}")]
    Comm(String),
}
