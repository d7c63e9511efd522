//! Bounded retry with capped exponential backoff and random jitter.
//!
//! Only [`GatewayError::Transient`] failures are retried. The delay schedule
//! is `min(base * 2^(attempt - 1), max) + U[0, jitter]`. The policy itself
//! knows nothing about HTTP or the async runtime; [`retry`] drives it with
//! `tokio::time::sleep`.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first call. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// No retries and no sleeping.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// `max_attempts` immediate attempts; for tests and local doubles.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::none()
        }
    }

    /// Deterministic backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// Random jitter in `[0, jitter]`.
    pub fn jitter_for(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        self.jitter.mul_f64(rand::random::<f64>())
    }
}

/// Run `op` under `policy`.
///
/// Returns the first success, the first permanent error, or
/// [`GatewayError::Exhausted`] once every attempt failed transiently.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    service: &'static str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let started = Instant::now();
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt) + policy.jitter_for();
                tracing::warn!(
                    service,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                return Err(GatewayError::Exhausted {
                    service,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                    last: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            jitter: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        assert_eq!(p.delay_for(4), Duration::from_secs(8));
        assert_eq!(p.delay_for(5), Duration::from_secs(8));
        assert_eq!(p.delay_for(40), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_bounded() {
        let p = policy();
        for _ in 0..100 {
            assert!(p.jitter_for() <= Duration::from_millis(250));
        }
        assert_eq!(RetryPolicy::none().jitter_for(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out = retry(&RetryPolicy::immediate(3), "test", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GatewayError::transient("test", "timeout"))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry(&RetryPolicy::immediate(3), "test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(GatewayError::transient("test", "503"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, GatewayError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry(&RetryPolicy::immediate(5), "test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(GatewayError::permanent("test", "400"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, GatewayError::Permanent { .. }));
    }
}
