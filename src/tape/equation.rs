//! Equations: one recorded solve on the tape.
//!
//! An equation binds the target [`Variable`] a solve produced to the blocks
//! that acted on it and the right-hand side that recomputes it. Equations
//! are immutable once registered.

use crate::backend::value::AdjointValue;
use crate::tape::block::Block;
use crate::tape::rhs::Rhs;
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;

/// One recorded solve: target variable, blocks, right-hand side.
#[derive(Debug)]
pub struct Equation<V: AdjointValue> {
    target: Variable,
    blocks: Vec<Box<dyn Block<V>>>,
    rhs: Box<dyn Rhs<V>>,
}

impl<V: AdjointValue> Equation<V> {
    /// Build an equation.
    ///
    /// # Errors
    /// Fails with [`TapeError::EmptyEquation`] when no blocks are supplied.
    pub fn new(
        target: Variable,
        blocks: Vec<Box<dyn Block<V>>>,
        rhs: Box<dyn Rhs<V>>,
    ) -> Result<Self, TapeError> {
        if blocks.is_empty() {
            return Err(TapeError::EmptyEquation(target));
        }
        Ok(Equation {
            target,
            blocks,
            rhs,
        })
    }

    /// The variable this equation produces.
    #[inline]
    pub fn target(&self) -> &Variable {
        &self.target
    }

    #[inline]
    pub fn blocks(&self) -> &[Box<dyn Block<V>>] {
        &self.blocks
    }

    /// The single block of this equation.
    ///
    /// # Errors
    /// Replay only handles single-block equations; anything else reports
    /// [`TapeError::NotImplemented`].
    pub fn single_block(&self) -> Result<&dyn Block<V>, TapeError> {
        match self.blocks.as_slice() {
            [block] => Ok(block.as_ref()),
            _ => Err(TapeError::NotImplemented(
                "replay of multi-block equations",
            )),
        }
    }

    #[inline]
    pub fn rhs(&self) -> &dyn Rhs<V> {
        self.rhs.as_ref()
    }
}
