//! Retry with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

/// Retry policy configuration.
///
/// The delay before retry `n` (zero-based) is
/// `min(initial_delay * multiplier^n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns the delay to wait before retry number `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Runs `operation`, retrying failures for which `is_retryable` returns
    /// true until the retry budget is spent. Returns the last error.
    pub async fn run<F, Fut, T, E, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !is_retryable(&error) => {
                    tracing::debug!(error = %error, "error is not retryable");
                    return Err(error);
                }
                Err(error) if attempt >= self.max_retries => {
                    tracing::warn!(attempt, error = %error, "retries exhausted");
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
