//! Crate root: public surface and core aliases
//!
//! This module is the single entry-point for downstream users. It
//! re-exports the scheduling driver's public types and centralizes the
//! crate-wide error surface.
//!
//! ## Invariants
//!
//! - **Exact arithmetic.** Every schedule coefficient is a [`rational::Rat`]
//!   (`num_rational::BigRational`); the LP backend works in `f64` internally
//!   but every value that leaves [`lp`] has already been snapped back to an
//!   exact rational (see [`rational::rationalize`]).
//! - **Width invariant.** Every [`cst::ConstraintMatrix`] built anywhere in
//!   this crate has exactly [`cst::cst_width`] columns; see that module's
//!   doc comment for the column layout.
//! - **No shared mutable state.** A [`scheduler::Prog`] owns every piece of
//!   state touched by one `schedule` call; nothing here is a global or a
//!   `static`. We **forbid unsafe** throughout the crate.
//! - **Monotone satisfaction.** A dependence's [`stmt::Satisfaction`] only
//!   ever moves from `Unsatisfied` to `SatisfiedAt(level)`, never back.
//!
//! If any of these invariants is violated at runtime because of a
//! construction bug, the failure mode is a `panic!` with a precise message
//! (never UB); expected outcomes like LP infeasibility are always `Option`
//! or a typed [`error::ScheduleError`], never a panic.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Exact rational arithmetic shared by every coefficient in the crate.
pub mod rational;
/// Statements, dependences, and the small index newtypes built on them.
pub mod stmt;
/// Farkas-dualized constraint builder (the shared coefficient-space width
/// invariant lives here).
pub mod cst;
/// LP/MILP oracle abstraction (`good_lp` + `microlp` backend by default).
pub mod lp;
/// Dependence graph and its SCC decomposition.
pub mod ddg;
/// Fusion conflict graph construction, mutation, and rebuild.
pub mod fcg;
/// Colouring & scaling driver.
pub mod colour;
/// Scheduling driver: owns `Prog` and the top-level `schedule` entry point.
pub mod scheduler;
/// Optional post-pass that skews loop levels for tileability.
pub mod skew;
/// Crate-wide error categories.
pub mod error;

pub use error::{ParamError, ScaleShiftError, ScheduleError};
pub use lp::{GoodLpOracle, LpOracle};
pub use rational::Rat;
pub use scheduler::{schedule, FuseMode, Prog, ProgSeed, ScheduleOptions, ScheduleStats, Solver};
pub use stmt::{Dep, DepKind, Direction, HProp, SccId, Stmt, StmtId};
