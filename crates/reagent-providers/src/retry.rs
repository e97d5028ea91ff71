//! Retry with linearly growing backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::GatewayError;

/// How many times to try a gateway call and how long to wait in between.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned unchanged.
///
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, GatewayError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    call = label,
                    attempt = attempt,
                    max_attempts = attempts,
                    kind = e.kind(),
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_delay_grows_with_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }

    #[test]
    fn test_delay_saturates_on_huge_base() {
        let policy = RetryPolicy::new(3, Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_for(2), Duration::MAX);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(GatewayError::Transport(format!("attempt {attempt}")))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_last_error_returned_after_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(3), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(GatewayError::Protocol(format!("bad body {attempt}"))) }
        })
        .await;

        assert_eq!(result.unwrap_err(), GatewayError::Protocol("bad body 3".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::InvalidRequest("empty".into())) }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(0), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, GatewayError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
