//! Blocks: the left-hand-side operators of tape equations.
//!
//! A block is a named linear operator. The tape stores blocks unassembled;
//! [`Block::assemble`] produces the concrete operator together with the
//! block's own right-hand-side contribution, and replay asks the assembled
//! operator to solve in either the forward or the hermitian direction.

use crate::backend::value::AdjointValue;
use crate::tape_error::TapeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capacity of a block name, including the terminator slot the wire format
/// reserves. Stored names hold at most `ADJ_NAME_LEN - 1` bytes.
pub const ADJ_NAME_LEN: usize = 4096;

/// A block name, truncated on construction to fit [`ADJ_NAME_LEN`].
///
/// Truncation lands on a `char` boundary, so a valid shorter name is always
/// produced. Distinct long names may truncate to the same stored name; block
/// names are diagnostic labels, and equation identity rests on the target
/// [`Variable`](crate::tape::variable::Variable) alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockName(String);

impl BlockName {
    /// Maximum stored length in bytes.
    pub const MAX_LEN: usize = ADJ_NAME_LEN - 1;

    /// Build a block name, truncating `raw` to [`BlockName::MAX_LEN`] bytes.
    pub fn new(raw: impl Into<String>) -> Self {
        let mut s: String = raw.into();
        if s.len() > Self::MAX_LEN {
            let mut cut = Self::MAX_LEN;
            while !s.is_char_boundary(cut) {
                cut -= 1;
            }
            s.truncate(cut);
        }
        BlockName(s)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockName {
    fn from(raw: &str) -> Self {
        BlockName::new(raw)
    }
}

/// An unassembled operator attached to a tape equation.
pub trait Block<V: AdjointValue>: Send + Sync + fmt::Debug {
    /// Diagnostic name of the block.
    fn name(&self) -> &BlockName;

    /// Assemble the operator.
    ///
    /// `hermitian` selects the adjoint of the operator, `coefficient` scales
    /// it. The assembled block carries its own additive right-hand-side
    /// contribution.
    ///
    /// # Errors
    /// Returns an error when the block cannot represent the requested
    /// assembly, e.g. a non-unit coefficient on an identity block.
    fn assemble(&self, hermitian: bool, coefficient: f64) -> Result<AssembledBlock<V>, TapeError>;
}

/// A concrete linear operator produced by [`Block::assemble`].
pub trait BlockOperator<V: AdjointValue>: Send + Sync + fmt::Debug {
    /// Dimension of the operator's square matrix.
    fn dim(&self) -> usize;

    /// Solve `A x = rhs`.
    fn solve(&self, rhs: &V) -> Result<V, TapeError>;

    /// Solve `A* x = rhs`.
    fn solve_hermitian(&self, rhs: &V) -> Result<V, TapeError>;
}

/// Result of assembling a block: the operator plus the block's additive
/// right-hand-side contribution.
#[derive(Debug)]
pub struct AssembledBlock<V> {
    operator: Box<dyn BlockOperator<V>>,
    addend: V,
}

impl<V: AdjointValue> AssembledBlock<V> {
    pub fn new(operator: Box<dyn BlockOperator<V>>, addend: V) -> Self {
        AssembledBlock { operator, addend }
    }

    #[inline]
    pub fn operator(&self) -> &dyn BlockOperator<V> {
        self.operator.as_ref()
    }

    /// The block's right-hand-side contribution.
    #[inline]
    pub fn addend(&self) -> &V {
        &self.addend
    }
}

/// The identity operator of a fixed dimension.
#[derive(Debug, Clone)]
pub struct IdentityOperator {
    dim: usize,
}

impl IdentityOperator {
    pub fn new(dim: usize) -> Self {
        IdentityOperator { dim }
    }
}

impl<V: AdjointValue> BlockOperator<V> for IdentityOperator {
    #[inline]
    fn dim(&self) -> usize {
        self.dim
    }

    fn solve(&self, rhs: &V) -> Result<V, TapeError> {
        if rhs.len() != self.dim {
            return Err(TapeError::DimensionMismatch {
                expected: self.dim,
                found: rhs.len(),
            });
        }
        Ok(rhs.clone())
    }

    fn solve_hermitian(&self, rhs: &V) -> Result<V, TapeError> {
        // identity is self-adjoint
        self.solve(rhs)
    }
}

/// Identity block over a function space: assembles to the identity operator
/// of the space's dimension with a zero right-hand-side contribution.
///
/// Annotation attaches one of these to every equation it records, so replay
/// reduces to evaluating the right-hand side and copying the result.
#[derive(Debug, Clone)]
pub struct IdentityBlock<V> {
    name: BlockName,
    zero: V,
}

impl<V: AdjointValue> IdentityBlock<V> {
    /// Build an identity block; the dimension is taken from `zero`, the zero
    /// value of the target space.
    pub fn new(name: BlockName, zero: V) -> Self {
        IdentityBlock { name, zero }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.zero.len()
    }
}

impl<V: AdjointValue> Block<V> for IdentityBlock<V> {
    fn name(&self) -> &BlockName {
        &self.name
    }

    fn assemble(&self, _hermitian: bool, coefficient: f64) -> Result<AssembledBlock<V>, TapeError> {
        if coefficient != 1.0 {
            return Err(TapeError::NotImplemented(
                "identity block assembly with a non-unit coefficient",
            ));
        }
        Ok(AssembledBlock::new(
            Box::new(IdentityOperator::new(self.zero.len())),
            self.zero.zero_like(),
        ))
    }
}
