//! Exponential-backoff retry around a single transport call.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::error::{QueryError, TransportError};

/// Jitter added to each backoff delay, as a fraction of the current delay.
const JITTER_FRACTION: f64 = 0.2;

/// Retry policy with exponential backoff and jitter.
///
/// The delay doubles after each failed attempt; the actual wait is the
/// current delay plus up to 20% random jitter, capped at `max_delay_ms`.
/// Every error is treated as retryable — permanent-failure classification
/// belongs to the transport, which should fail without raising at all if it
/// has already concluded the call can never succeed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before giving up (the first call counts as one).
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,

    /// Cap on any single wait, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    /// Recommended defaults: 5 attempts, 1s initial delay, 60s cap.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy with custom settings.
    ///
    /// # Panics
    /// Panics if `max_attempts` is zero or `max_delay_ms < initial_delay_ms`.
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        assert!(max_attempts > 0, "max_attempts must be greater than 0");
        assert!(
            max_delay_ms >= initial_delay_ms,
            "max_delay_ms must be >= initial_delay_ms"
        );
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
        }
    }

    /// Execute an operation, retrying on failure with exponential backoff.
    ///
    /// Makes exactly one underlying call per attempt and never retries after
    /// a success. Fails with [`QueryError::MaxRetriesExceeded`] carrying the
    /// last underlying error once the attempt budget is spent.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut delay = self.initial_delay_ms;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "transport call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if attempt >= self.max_attempts {
                        warn!(attempts = attempt, error = %err, "transport retries exhausted");
                        return Err(QueryError::MaxRetriesExceeded {
                            attempts: attempt,
                            cause: err,
                        });
                    }

                    let wait_ms = self.backoff_with_jitter(delay);
                    warn!(
                        attempt,
                        wait_ms,
                        error = %err,
                        "transport call failed, backing off"
                    );
                    sleep(Duration::from_millis(wait_ms)).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    /// Current delay plus up to 20% random jitter, capped at the maximum.
    fn backoff_with_jitter(&self, delay_ms: u64) -> u64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jitter = (rand::random::<f64>() * JITTER_FRACTION * delay_ms as f64) as u64;
        delay_ms.saturating_add(jitter).min(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 1, 10)
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay_ms, 1_000);
        assert_eq!(policy.max_delay_ms, 60_000);
    }

    #[test]
    fn test_backoff_with_jitter_bounds() {
        let policy = RetryPolicy::new(5, 1_000, 60_000);
        for _ in 0..100 {
            let wait = policy.backoff_with_jitter(1_000);
            assert!(wait >= 1_000);
            assert!(wait <= 1_200);
        }
        // Capped at the maximum regardless of jitter.
        assert_eq!(policy.backoff_with_jitter(60_000), 60_000);
        assert_eq!(policy.backoff_with_jitter(100_000), 60_000);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_makes_one_call() {
        let policy = fast_policy(5);
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<i32, TransportError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds_makes_three_calls() {
        let policy = fast_policy(5);
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err::<i32, TransportError>("transient failure".into())
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
    async fn test_exhaustion_makes_exactly_max_attempts_calls() {
        let policy = fast_policy(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<i32, QueryError> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("permanent failure".into())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(QueryError::MaxRetriesExceeded { attempts, cause }) => {
                assert_eq!(attempts, 3);
                assert_eq!(cause.to_string(), "permanent failure");
            }
            other => panic!("expected MaxRetriesExceeded, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "max_attempts must be greater than 0")]
    fn test_rejects_zero_attempts() {
        let _ = RetryPolicy::new(0, 1, 10);
    }
}
