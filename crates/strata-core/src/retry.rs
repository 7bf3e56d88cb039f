//! Retry with bounded exponential backoff.
//!
//! Retry decisions are driven by [`ErrorKind::is_retryable`]; the
//! message text is never inspected. Each attempt runs under its own
//! timeout so a hung upstream cannot stall the turn indefinitely.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ErrorKind, StrataError, StrataResult};

/// Configuration for retryable upstream calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Backoff delay before the retry following `attempt` (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` with retry and per-attempt timeout.
///
/// `op` is called to produce a fresh future for each attempt. Errors
/// whose kind is not retryable are returned immediately. A rate-limit
/// error carrying a `retry_after` hint overrides the computed backoff.
///
/// # Errors
///
/// Returns the final error once attempts are exhausted, or the first
/// non-retryable error.
pub async fn retry<T, F, Fut>(config: RetryConfig, what: &str, mut op: F) -> StrataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StrataResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = match tokio::time::timeout(config.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(StrataError::new(
                ErrorKind::UpstreamTimeout,
                format!(
                    "{what} timed out after {}s",
                    config.attempt_timeout.as_secs()
                ),
            )),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                let next_attempt = attempt.saturating_add(1);
                if !err.kind.is_retryable() || next_attempt >= config.max_attempts {
                    if attempt > 0 {
                        warn!(what, attempts = next_attempt, kind = %err.kind, "Giving up after retries");
                    }
                    return Err(err);
                }

                let delay = err
                    .retry_after_secs
                    .map_or_else(|| config.delay_for_attempt(attempt), Duration::from_secs);
                debug!(what, attempt = next_attempt, delay_ms = delay.as_millis() as u64, kind = %err.kind, "Retrying");
                tokio::time::sleep(delay).await;
                attempt = next_attempt;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry(fast_config(), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StrataError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry(fast_config(), "op", move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StrataError::new(ErrorKind::UpstreamTransient, "flaky"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: StrataResult<i32> = retry(fast_config(), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StrataError::new(ErrorKind::Validation, "bad input"))
            }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: StrataResult<i32> = retry(fast_config(), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StrataError::new(ErrorKind::UpstreamTransient, "down"))
            }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::UpstreamTransient);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }
}
