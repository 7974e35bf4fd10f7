//! Optimization over tape-recorded models.
//!
//! The pieces stack bottom-up: [`control`] defines what an optimizer may
//! vary, [`layout`] and [`vec`] flatten controls into distributed vectors
//! with contiguous owner ranges, [`reduced`] turns tape replay into `J(m)`
//! with gradients, and [`tao`] adapts all of it to a TAO-style solver
//! behind a driver seam.

pub mod control;
pub mod layout;
pub mod reduced;
pub mod tao;
pub mod vec;

pub use control::{BoundValue, Bounds, ConstantValue, Control};
pub use layout::{LayoutEntry, PackLayout, decide_partition};
pub use reduced::{ReducedFunctional, TapeReducedFunctional};
pub use tao::{
    ConstraintSpec, OptimizationProblem, RieszMap, TAO_OPTION_PREFIX, TaoCallbacks, TaoDriver,
    TaoOptions, TaoSetup, TaoSolution, TaoSolver,
};
pub use vec::{GlobalVec, pack_controls, unpack_controls};
