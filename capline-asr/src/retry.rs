//! Capped exponential backoff for provider requests.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;

/// Retry policy for transient provider failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (0-based): `min(base * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `operation` until it succeeds, fails non-transiently, or attempts run out.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 >= attempts || !err.is_transient() => return Err(err),
                Err(err) => {
                    let wait = self.delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        attempts,
                        ?wait,
                        stage = label,
                        error = %err,
                        "retrying provider request"
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn status(code: u16) -> ProviderError {
        ProviderError::Status {
            status: code,
            body: "boom".to_string(),
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(16));
        assert_eq!(policy.delay(5), Duration::from_secs(30));
        assert_eq!(policy.delay(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);

        let result = fast(3)
            .run("test", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(status(503)) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_cap() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = fast(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(429))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Status { status: 429, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = fast(5)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(401))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);

        let _ = fast(0)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status(500))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
