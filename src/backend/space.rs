//! Function-space handles.

use std::fmt;

/// A named function space with a fixed (rank-local) dimension.
///
/// The tape never looks inside a space; it only needs the dimension to size
/// identity blocks and the name to label them.
pub trait FunctionSpace: Clone + PartialEq + Send + Sync + fmt::Debug + 'static {
    /// Name of the space, used in block labels.
    fn name(&self) -> &str;

    /// Rank-local dimension.
    fn dim(&self) -> usize;
}
