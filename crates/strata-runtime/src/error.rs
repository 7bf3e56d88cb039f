//! Runtime error type.
//!
//! Wraps the component errors and carries the [`ErrorKind`] category
//! that drives retry behavior and HTTP status mapping.

use strata_core::ErrorKind;
use thiserror::Error;

/// Errors from the turn pipeline.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Malformed or inconsistent input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced object does not exist.
    #[error("{what} not found: {id}")]
    NotFound {
        /// What was looked up.
        what: &'static str,
        /// The missing id or tag.
        id: String,
    },

    /// Duplicate unique key or conflicting concurrent operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rejected by the rate limiter.
    #[error("rate limited: {reason}")]
    RateLimited {
        /// Rejection reason.
        reason: String,
        /// Seconds until the window resets.
        retry_after_secs: Option<u64>,
    },

    /// Monthly quota exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// LLM failure.
    #[error(transparent)]
    Llm(#[from] strata_llm::LlmError),

    /// MCP failure.
    #[error(transparent)]
    Mcp(#[from] strata_mcp::McpError),

    /// Session store failure.
    #[error(transparent)]
    Session(#[from] strata_session::SessionError),

    /// Consumption store failure.
    #[error(transparent)]
    Consumption(#[from] strata_consumption::ConsumptionError),

    /// Knowledge graph failure.
    #[error(transparent)]
    Kg(#[from] strata_kg::KgError),

    /// Registry persistence failure.
    #[error("registry error: {0}")]
    Registry(String),

    /// A tagged upstream failure, produced by the retry layer.
    #[error(transparent)]
    Tagged(#[from] strata_core::StrataError),

    /// The turn was cancelled by the client.
    #[error("turn cancelled")]
    Cancelled,

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::Llm(e) => e.kind(),
            Self::Mcp(e) => e.kind(),
            Self::Session(e) => e.kind(),
            Self::Consumption(e) => e.kind(),
            Self::Kg(e) => e.kind(),
            Self::Tagged(e) => e.kind,
            Self::Cancelled => ErrorKind::Validation,
            Self::Registry(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Retry-after hint for rate-limit errors.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            Self::Tagged(e) => e.retry_after_secs,
            _ => None,
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            RuntimeError::QuotaExceeded("out".into()).kind(),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            RuntimeError::RateLimited {
                reason: "hourly".into(),
                retry_after_secs: Some(60)
            }
            .kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            RuntimeError::NotFound {
                what: "profile",
                id: "x".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_llm_kind_passthrough() {
        let err = RuntimeError::Llm(strata_llm::LlmError::Timeout { timeout_secs: 120 });
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
        assert!(err.kind().is_retryable());
    }
}
