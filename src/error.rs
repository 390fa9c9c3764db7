//! Crate-wide error categories
//!
//! Each module that can fail defines its own focused `thiserror` enum;
//! [`ScheduleError`] aggregates them behind `#[error(transparent)]` so a
//! caller driving [`crate::scheduler::schedule`] only has to match one type.

/// Parameter/shape validation failures raised before any solving happens.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    /// `ProgSeed::stmts` was empty.
    #[error("program has no statements")]
    EmptyProgram,
    /// A statement was constructed with `d_orig == 0`.
    #[error("statement {0:?} has zero loop dimensions")]
    DegenerateStatement(crate::stmt::StmtId),
    /// A dependence referenced a statement index past the end of `stmts`.
    #[error("dependence references unknown statement {0:?}")]
    UnknownStatement(crate::stmt::StmtId),
}

/// Failures raised while realizing a coloured dimension as a schedule row.
#[derive(Debug, thiserror::Error)]
pub enum ScaleShiftError {
    /// `lexmin` reported infeasible for a round the colourer had already
    /// accepted — an invariant violation rather than an expected outcome.
    #[error("lexicographic minimisation returned infeasible for an scc already marked colourable")]
    LexminInfeasible,
}

/// Top-level error type returned by [`crate::scheduler::schedule`].
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Wraps a [`ParamError`].
    #[error(transparent)]
    Param(#[from] ParamError),
    /// Wraps a [`ScaleShiftError`].
    #[error(transparent)]
    ScaleShift(#[from] ScaleShiftError),
}
