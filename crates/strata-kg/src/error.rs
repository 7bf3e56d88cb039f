//! Knowledge graph error types.

use strata_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur with knowledge graph operations.
#[derive(Debug, Error)]
pub enum KgError {
    /// Database failure.
    #[error("knowledge graph database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// Referenced entity or relationship does not exist.
    #[error("knowledge graph {what} not found: {id}")]
    NotFound {
        /// "entity" or "relationship".
        what: &'static str,
        /// The missing id.
        id: i64,
    },

    /// Invalid input (unknown type name, endpoint mismatch, ...).
    #[error("invalid knowledge graph input: {0}")]
    Invalid(String),

    /// A JSON column could not be parsed.
    #[error("corrupt knowledge graph column: {0}")]
    Corrupt(String),
}

impl KgError {
    /// Error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Invalid(_) => ErrorKind::Validation,
            Self::Db(_) | Self::Corrupt(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for knowledge graph operations.
pub type KgResult<T> = Result<T, KgError>;
