//! Session store error types.

use strata_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur with session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Filesystem failure.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A session file holds invalid JSON.
    #[error("corrupt session file {path}: {reason}")]
    Corrupt {
        /// File path.
        path: String,
        /// Parse failure detail.
        reason: String,
    },

    /// Serialization failure.
    #[error("session serialization error: {0}")]
    Serialization(String),

    /// The requested session does not exist.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The requested purge field is unknown.
    #[error("unknown session field: {0}")]
    UnknownField(String),
}

impl SessionError {
    /// Error category, used for HTTP mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UnknownField(_) => ErrorKind::Validation,
            Self::Io(_) | Self::Corrupt { .. } | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
