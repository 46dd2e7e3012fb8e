//! Timeouts and bounded retries for external model calls
//!
//! Every call to the embedding or completion provider goes through
//! [`call_with_retry`]: each attempt is wrapped in a hard timeout, transient
//! failures are retried with exponential backoff, and the number of attempts
//! is capped so a request can never hang or loop.

use crate::errors::{AppError, Result};
use backoff::{future::retry_notify, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Upper bound on a single backoff sleep
const MAX_BACKOFF_INTERVAL: Duration = Duration::from_secs(5);

/// Retry and timeout settings for one external service
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Hard limit for a single attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff interval (doubles on every retry)
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout_secs: u64, max_retries: u32, initial_backoff_ms: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        // Elapsed-time cap is a second guard; the attempt counter is the real bound.
        let budget = (self.timeout + MAX_BACKOFF_INTERVAL) * (self.max_retries + 1);
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.25)
            .with_max_interval(MAX_BACKOFF_INTERVAL)
            .with_max_elapsed_time(Some(budget))
            .build()
    }
}

/// Run `operation` under `policy`.
///
/// `on_timeout` builds the typed timeout error (embedding or completion) from
/// the elapsed limit in milliseconds. Errors for which
/// [`AppError::is_transient`] is false are returned after the first attempt.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    service: &'static str,
    on_timeout: fn(u64) -> AppError,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = AtomicU32::new(0);
    let timeout = policy.timeout;
    let max_attempts = policy.max_retries + 1;

    retry_notify(
        policy.backoff(),
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let call = operation();
            async move {
                let err = match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(value)) => return Ok(value),
                    Ok(Err(e)) => e,
                    Err(_) => on_timeout(timeout.as_millis() as u64),
                };

                if err.is_transient() && attempt < max_attempts {
                    Err(backoff::Error::transient(err))
                } else {
                    Err(backoff::Error::permanent(err))
                }
            }
        },
        |err: AppError, delay: Duration| {
            tracing::warn!(
                service = service,
                attempt = attempts.load(Ordering::SeqCst),
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "External call failed, retrying"
            );
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn timeout_error(ms: u64) -> AppError {
        AppError::EmbeddingTimeout { timeout_ms: ms }
    }

    fn transient() -> AppError {
        AppError::EmbeddingError {
            message: "503 Service Unavailable".into(),
            transient: true,
        }
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let calls = AtomicUsize::new(0);
        let result = call_with_retry(&fast_policy(3), "embedding", timeout_error, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = call_with_retry(&fast_policy(3), "embedding", timeout_error, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::EmbeddingError {
                    message: "401 Unauthorized".into(),
                    transient: false,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::EmbeddingError { transient: false, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = call_with_retry(&fast_policy(2), "embedding", timeout_error, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_with_typed_error() {
        let result: Result<()> = call_with_retry(&fast_policy(0), "embedding", timeout_error, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::EmbeddingTimeout { timeout_ms: 50 })));
    }
}
