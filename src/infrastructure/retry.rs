//! Retry with exponential backoff and jitter
//!
//! Wraps a single backend call. Transient failures are retried up to the
//! attempt ceiling; anything else is returned on the first attempt.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::domain::errors::BackendError;

/// Backoff configuration for backend calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound of the un-jittered delay
    pub max_delay: Duration,
    /// Relative jitter, e.g. 0.3 for ±30%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after the given failed attempt (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    /// Delay after the given failed attempt with random jitter applied
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = self.jitter.min(1.0);
        let factor = 1.0 + rand::thread_rng().gen_range(-spread..=spread);
        base.mul_f64(factor.max(0.0))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the policy's
/// attempt ceiling is reached
pub async fn retry_transient<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} transient failure (attempt {}/{}): {}; retrying in {:?}",
                    operation, attempt, max_attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{BackendErrorKind, TransientCause};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.3,
        }
    }

    fn transient() -> BackendError {
        BackendError::new("op", BackendErrorKind::Transient(TransientCause::Disconnect))
    }

    #[test]
    fn test_base_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_millis(500));
        assert_eq!(policy.base_delay(2), Duration::from_secs(1));
        assert_eq!(policy.base_delay(3), Duration::from_secs(2));
        assert_eq!(policy.base_delay(5), Duration::from_secs(8));
        assert_eq!(policy.base_delay(6), Duration::from_secs(10));
        assert_eq!(policy.base_delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=6 {
            let base = policy.base_delay(attempt).as_secs_f64();
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt).as_secs_f64();
                assert!(delay >= base * 0.7 - 1e-9 && delay <= base * 1.3 + 1e-9);
            }
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_attempt_that_returns_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_transient("op", &fast_policy(), || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 4 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_stops_at_attempt_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_transient("op", &fast_policy(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_transient("op", &fast_policy(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::from_status("op", 400, "bad".to_string())) }
        })
        .await;

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
