//! This module contains errors pertaining to the lookahead analysis itself.
//!
//! These represent internal inconsistencies between the analyzer and its
//! host, as opposed to analysis verdicts: the judgement that a suffix may
//! fail is a normal, cacheable outcome and is not represented here.

use thiserror::Error;

/// Errors that occur while running the lookahead analysis.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The analysis has not been started")]
    NotStarted,

    #[error(
        "Expected a feasible prefix, but replay reached an unreachable state at index \
         {index} (pc {pc})"
    )]
    InfeasiblePrefix { index: usize, pc: u64 },
}

impl Error {
    /// Checks whether the error arose while replaying the prefix.
    ///
    /// Prefix-phase errors are deterministic for a given prefix, so the host
    /// must not retry the same query.
    #[must_use]
    pub fn in_prefix(&self) -> bool {
        matches!(self, Self::InfeasiblePrefix { .. })
    }
}

/// The result type for methods that may have analysis errors.
pub type Result<T> = std::result::Result<T, Error>;
