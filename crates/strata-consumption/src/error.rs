//! Consumption store error types.

use strata_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur with consumption accounting.
#[derive(Debug, Error)]
pub enum ConsumptionError {
    /// Database failure.
    #[error("consumption database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// JSON column could not be parsed.
    #[error("corrupt consumption column {column}: {reason}")]
    CorruptColumn {
        /// Column name.
        column: String,
        /// Parse failure detail.
        reason: String,
    },
}

impl ConsumptionError {
    /// Error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Db(_) | Self::CorruptColumn { .. } => ErrorKind::Internal,
        }
    }
}

/// Result type for consumption operations.
pub type ConsumptionResult<T> = Result<T, ConsumptionError>;
