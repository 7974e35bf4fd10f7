//! Top-level module for the adjoint tape.
//!
//! This module provides the core types of the recording layer:
//! - Variable identities and the registry that allocates them
//! - Blocks (left-hand-side operators) and right-hand sides
//! - Equations, the unit of recording
//! - The adjointer tape itself, with its checkpoint policy
//!
//! Most users will interact with [`Adjointer`] through the annotation
//! helpers in [`crate::annotate`] rather than registering equations by hand.

pub mod adjointer;
pub mod block;
pub mod checkpoint;
pub mod equation;
pub mod rhs;
pub mod variable;

pub use adjointer::Adjointer;
pub use block::{
    ADJ_NAME_LEN, AssembledBlock, Block, BlockName, BlockOperator, IdentityBlock,
    IdentityOperator,
};
pub use checkpoint::{CheckpointAction, CheckpointStrategy, RecordedValue};
pub use equation::Equation;
pub use rhs::{
    Direction, IdentityRhs, InitialValueRhs, InterpolateRhs, PointIntegralStepRhs, Rhs,
};
pub use variable::{Variable, VariableRegistry};
