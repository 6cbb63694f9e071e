use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};

use crate::error::AppResult;

/// Backoff parameters for read requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Successful calls never resolve faster than this, so loading states don't flicker
    pub min_latency: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            min_latency: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    /// Single attempt without a latency floor
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            min_latency: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay slept before `attempt` (1-based): none before the first, then
    /// `base * 2^(attempt - 2)` capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// Only [`AppError::is_retryable`](crate::error::AppError::is_retryable) failures are
/// retried. The last error is returned once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if !policy.min_latency.is_zero() {
                    sleep_until(started + policy.min_latency).await;
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(attempts = attempt, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
