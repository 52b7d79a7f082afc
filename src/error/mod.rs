//! This module contains the primary error type for the analyzer's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.
//!
//! # Anyhow
//!
//! All of the errors implement [`std::error::Error`], and hence can be used
//! with [`anyhow::Error`] internally. It is _not_ recommended to use that
//! error type in the interface of the library, as this forces clients to also
//! use `anyhow`.

pub mod analysis;

use std::rc::Rc;

use thiserror::Error;

/// The interface result type for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by
/// the clients of the library) should be members of this enum. These are true
/// errors, not analysis verdicts: a suffix that may fail is an ordinary
/// [`crate::interpreter::verdict::Verdict`] outcome, never an error.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Errors from the analysis subsystem of the library.
    #[error(transparent)]
    Analysis(#[from] analysis::Error),

    /// An analysis error raised while answering a suffix query, together
    /// with the identifier of the prefix that was being queried.
    #[error("analysis of prefix {prefix_id} failed")]
    Query {
        /// The identifier of the queried prefix.
        prefix_id: String,

        /// The underlying analysis error.
        #[source]
        source: analysis::Error,
    },

    /// Unknown errors, usually from the dependencies of the library.
    ///
    /// It is wrapped in an [`Rc`] to ensure that it can be cloned like the
    /// other error types in this interface error.
    #[error(transparent)]
    Other(Rc<anyhow::Error>),
}

impl Error {
    /// Checks whether the host should avoid retrying the query that produced
    /// this error with the same prefix.
    ///
    /// Errors raised while replaying the prefix are deterministic and will
    /// recur; the host should split its exploration earlier instead.
    #[must_use]
    pub fn avoid_retry(&self) -> bool {
        match self {
            Self::Analysis(inner) => inner.in_prefix(),
            Self::Query { source, .. } => source.in_prefix(),
            Self::Other(_) => false,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(Rc::new(value))
    }
}
