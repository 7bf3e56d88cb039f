//! LLM-related error types.

use strata_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur with LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API key not configured.
    #[error("API key not configured for {provider}")]
    ApiKeyNotConfigured {
        /// Provider name.
        provider: String,
    },

    /// Credentials were rejected by the provider.
    #[error("authentication rejected by {provider}")]
    AuthRejected {
        /// Provider name.
        provider: String,
    },

    /// API request failed with a permanent status.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimitExceeded {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Transient upstream failure (5xx, connection reset).
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The call exceeded its timeout.
    #[error("LLM call timed out after {timeout_secs}s")]
    Timeout {
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// Invalid response from API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Context length exceeded.
    #[error("context length exceeded: {current} tokens, max is {max}")]
    ContextLengthExceeded {
        /// Current token count.
        current: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Error category, used for retry decisions and HTTP mapping.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ApiKeyNotConfigured { .. } | Self::AuthRejected { .. } => ErrorKind::Auth,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimited,
            Self::Timeout { .. } => ErrorKind::UpstreamTimeout,
            Self::Transient(_) => ErrorKind::UpstreamTransient,
            Self::HttpError(e) if e.is_timeout() => ErrorKind::UpstreamTimeout,
            Self::HttpError(e) if e.is_connect() => ErrorKind::UpstreamTransient,
            Self::ApiRequestFailed(_) | Self::HttpError(_) => ErrorKind::UpstreamPermanent,
            Self::ContextLengthExceeded { .. } | Self::ConfigError(_) => ErrorKind::Validation,
            Self::InvalidResponse(_) | Self::SerializationError(_) => ErrorKind::Internal,
        }
    }
}

impl From<LlmError> for strata_core::StrataError {
    fn from(err: LlmError) -> Self {
        let kind = err.kind();
        let retry_after = match &err {
            LlmError::RateLimitExceeded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let mut tagged = Self::new(kind, err.to_string()).with_cause(err);
        if let Some(secs) = retry_after {
            tagged = tagged.with_retry_after(secs);
        }
        tagged
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            LlmError::ApiKeyNotConfigured {
                provider: "claude".into()
            }
            .kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            LlmError::RateLimitExceeded {
                retry_after_secs: 30
            }
            .kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            LlmError::Timeout { timeout_secs: 120 }.kind(),
            ErrorKind::UpstreamTimeout
        );
        assert_eq!(
            LlmError::Transient("reset".into()).kind(),
            ErrorKind::UpstreamTransient
        );
        assert!(LlmError::Transient("reset".into()).kind().is_retryable());
        assert!(!LlmError::ApiRequestFailed("418".into()).kind().is_retryable());
    }
}
