//! Error → HTTP mapping.
//!
//! Status codes come from [`ErrorKind::http_status`]; the body never
//! echoes credentials, and internal errors carry only a trace id for
//! log correlation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use strata_core::{ErrorKind, TraceId};
use strata_runtime::RuntimeError;

/// API error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    trace_id: String,
}

/// An error leaving the HTTP surface.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    retry_after: Option<u64>,
}

impl ApiError {
    /// Wrap a categorized kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Validation shorthand.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Not-found shorthand.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        Self {
            kind: err.kind(),
            retry_after: err.retry_after_secs(),
            message: err.to_string(),
        }
    }
}

impl From<strata_kg::KgError> for ApiError {
    fn from(err: strata_kg::KgError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retry_after: None,
        }
    }
}

impl From<strata_consumption::ConsumptionError> for ApiError {
    fn from(err: strata_consumption::ConsumptionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retry_after: None,
        }
    }
}

impl From<strata_session::SessionError> for ApiError {
    fn from(err: strata_session::SessionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retry_after: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let trace_id = TraceId::new();
        let status =
            StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Internal errors log the detail and surface only the class.
        let message = if self.kind == ErrorKind::Internal {
            error!(trace = %trace_id, message = %self.message, "Internal error");
            "internal error".to_string()
        } else {
            self.message
        };

        let mut response = (
            status,
            axum::Json(ErrorBody {
                error: ErrorDetail {
                    kind: self.kind,
                    message,
                    retry_after: self.retry_after,
                    trace_id: trace_id.to_string(),
                },
            }),
        )
            .into_response();

        if let Some(secs) = self.retry_after
            && let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert("retry-after", value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError::new(ErrorKind::QuotaExceeded, "monthly quota exhausted");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = ApiError::from(RuntimeError::RateLimited {
            reason: "hourly limit exceeded".into(),
            retry_after_secs: Some(120),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "120");
    }

    #[test]
    fn test_internal_message_redacted() {
        let err = ApiError::new(ErrorKind::Internal, "sqlite file corrupted at /secret/path");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
