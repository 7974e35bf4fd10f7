#![cfg_attr(docsrs, feature(doc_cfg))]
//! # adjoint-tape
//!
//! adjoint-tape records the structure of a forward PDE solve as a tape of
//! equations and replays it: forward to recompute states at new inputs, and
//! backwards to obtain gradients of a functional with respect to controls.
//! On top of the tape sits a control-packing layer and an adapter exposing
//! objective, gradient and Hessian callbacks to TAO-style optimizers over
//! distributed flat vectors.
//!
//! ## Features
//! - Append-only equation tape keyed by `(name, timestep, iteration)`
//!   variables, with a registry that hands out successive iterations
//! - Annotation interceptors for assignments, interpolations and
//!   point-integral scheme steps
//! - Checkpointing of right-hand-side coefficients to memory or disk,
//!   selected per run by a checkpoint strategy
//! - Forward replay with pinned overrides and a reverse adjoint sweep
//! - Control packing into distributed vectors with contiguous owner ranges,
//!   plus bounds handling and an optimizer driver seam
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Determinism
//!
//! Replay is a pure function of the tape, the recorded values and the pinned
//! overrides; replaying twice yields identical states. Collectives require
//! every rank to issue the same call sequence in lockstep.
//!
//! ## Usage
//! Add `adjoint-tape` as a dependency in your `Cargo.toml` and enable
//! features as needed:
//!
//! ```toml
//! [dependencies]
//! adjoint-tape = "0.2.1"
//! # Optional features:
//! # features = ["mpi-support","check-invariants"]
//! ```

pub mod annotate;
pub mod backend;
pub mod comm;
pub mod debug_invariants;
pub mod optimize;
pub mod replay;
pub mod tape;
pub mod tape_error;

pub use debug_invariants::DebugInvariants;
pub use tape_error::TapeError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::annotate::{assign, register_initial_conditions, to_annotate};
    pub use crate::annotate::interpolate::interpolate;
    pub use crate::annotate::point_integral::PointIntegralSolver;
    pub use crate::backend::{AdjointValue, FunctionSpace, Interpolate, SchemeStepper};
    pub use crate::comm::Communicator;
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{NoComm, RayonComm};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::optimize::{
        Bounds, Control, GlobalVec, OptimizationProblem, PackLayout, ReducedFunctional,
        TaoDriver, TaoOptions, TaoSolver, TapeReducedFunctional,
    };
    pub use crate::replay::{
        FnFunctional, Functional, ReplayState, replay_adjoint, replay_forward,
    };
    pub use crate::tape::{
        Adjointer, Block, CheckpointStrategy, Equation, Rhs, Variable, VariableRegistry,
    };
    pub use crate::tape_error::TapeError;
}
