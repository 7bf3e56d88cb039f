//! Error taxonomy shared by every Strata component.
//!
//! Retry policy and HTTP mapping consult [`ErrorKind`], never the
//! message text. Messages must not contain credentials.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TraceId;

/// Category of a failure.
///
/// Every error produced inside the turn pipeline carries exactly one
/// kind; downstream layers decide retry and status-code behavior from
/// it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input or schema violation. Never retried.
    Validation,
    /// Credentials missing or rejected.
    Auth,
    /// Referenced session, profile, or entity does not exist.
    NotFound,
    /// Concurrent activation or duplicate unique key.
    Conflict,
    /// Rejected by the rate limiter or a provider 429.
    RateLimited,
    /// Monthly token quota exhausted.
    QuotaExceeded,
    /// LLM or MCP call timed out.
    UpstreamTimeout,
    /// Transient upstream failure (5xx, connection reset).
    UpstreamTransient,
    /// Permanent upstream failure (non-auth 4xx).
    UpstreamPermanent,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// Whether a call failing with this kind may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::UpstreamTimeout | Self::UpstreamTransient
        )
    }

    /// HTTP status code this kind maps to at the REST surface.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::Auth => 401,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimited => 429,
            Self::QuotaExceeded => 402,
            Self::UpstreamTimeout | Self::UpstreamTransient => 503,
            Self::UpstreamPermanent => 502,
            Self::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RateLimited => "rate_limited",
            Self::QuotaExceeded => "quota_exceeded",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamTransient => "upstream_transient",
            Self::UpstreamPermanent => "upstream_permanent",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A categorized Strata error.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct StrataError {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable message (credential-free).
    pub message: String,
    /// Seconds the caller should wait before retrying, when known.
    pub retry_after_secs: Option<u64>,
    /// Correlation id for log lookup, set when the error is surfaced.
    pub trace_id: Option<TraceId>,
    /// Underlying cause, if any.
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StrataError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
            trace_id: None,
            cause: None,
        }
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Attach a retry-after hint.
    #[must_use]
    pub const fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Attach a trace id for log correlation.
    #[must_use]
    pub const fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Result type for categorized operations.
pub type StrataResult<T> = Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(ErrorKind::UpstreamTimeout.is_retryable());
        assert!(ErrorKind::UpstreamTransient.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::UpstreamPermanent.is_retryable());
    }

    #[test]
    fn test_http_mapping() {
        assert_eq!(ErrorKind::Validation.http_status(), 422);
        assert_eq!(ErrorKind::QuotaExceeded.http_status(), 402);
        assert_eq!(ErrorKind::RateLimited.http_status(), 429);
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
        assert_eq!(ErrorKind::UpstreamTimeout.http_status(), 503);
        assert_eq!(ErrorKind::UpstreamPermanent.http_status(), 502);
    }

    #[test]
    fn test_error_display() {
        let err = StrataError::new(ErrorKind::NotFound, "session missing").with_retry_after(30);
        assert_eq!(err.to_string(), "not_found: session missing");
        assert_eq!(err.retry_after_secs, Some(30));
    }
}
