use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::AppResult;

/// Shared retry contract for external-call sites.
///
/// Transient failures (network errors, timeouts, provider 5xx) are retried
/// with exponential backoff plus jitter, capped at `max_delay`. Non-transient
/// failures propagate immediately. Which failures qualify is decided by
/// [`AppError::is_transient`], keeping the policy unit-testable independent
/// of any HTTP client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 retries = up to 4 calls)
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between attempts, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Runs the operation under this policy, returning the first success or
    /// the last error once transient retries are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        operation = %operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if exponential.is_zero() {
            return exponential;
        }
        // Up to 25% jitter keeps concurrent retries from synchronizing.
        let jitter = exponential.mul_f64(rand::thread_rng().gen_range(0.0..0.25));
        (exponential + jitter).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_transient_failure_retried_until_success() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);

        let result: AppResult<&str> = policy
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::external_api(503, "unavailable"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_failure_not_retried() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = policy
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::external_api(400, "bad request")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let policy = RetryPolicy::immediate(2);
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = policy
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::external_api(500, "still down")) }
            })
            .await;

        // Initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            AppError::ExternalApi { status, .. } => assert_eq!(status, Some(500)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };

        for attempt in 0..10 {
            assert!(policy.backoff_delay(attempt) <= Duration::from_secs(2));
        }
    }
}
