//! Circuit breaker.
//!
//! ```text
//!            failure_threshold consecutive failures
//! Closed ───────────────────────────────────────────► Open
//!   ▲                                                  │
//!   │ half_open_successes successes                    │ recovery_window elapsed
//!   │                                                  ▼
//!   └──────────────────────────────────────────── HalfOpen
//!                          any failure ──► Open
//! ```
//!
//! A call that exceeds `call_timeout` is abandoned and counts as a failure.
//! While half-open, at most `half_open_successes` trial calls are in flight at
//! once; further calls are rejected as if the circuit were open.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Upper bound on a single call.
    pub call_timeout: Duration,
    /// Time the circuit stays open before admitting trial calls.
    pub recovery_window: Duration,
    /// Successful trial calls needed to close the circuit again. Also caps
    /// the trial calls admitted concurrently while half-open.
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            call_timeout: Duration::from_secs(1),
            recovery_window: Duration::from_secs(5),
            half_open_successes: 1,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; consecutive failures are counted.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// Trial calls are admitted to test whether the collaborator recovered.
    HalfOpen,
}

impl BreakerState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "Closed",
            BreakerState::Open => "Open",
            BreakerState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a call made through the breaker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the call was not attempted.
    #[error("Circuit breaker '{0}' is open")]
    Open(&'static str),

    /// The call did not finish within the configured timeout.
    #[error("Call through circuit breaker '{name}' timed out after {timeout:?}")]
    Timeout {
        name: &'static str,
        timeout: Duration,
    },

    /// The call ran and failed.
    #[error(transparent)]
    Inner(E),
}

/// Counters for monitoring a breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    trials_in_flight: u32,
    opened_at: Option<Instant>,
    stats: CircuitBreakerStats,
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Rejected,
    Admitted,
    Trial,
}

/// Guards calls to one external collaborator. Clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    /// Creates a closed breaker. `name` labels logs and metrics.
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                trials_in_flight: 0,
                opened_at: None,
                stats: CircuitBreakerStats::default(),
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state, moving Open to HalfOpen if the recovery
    /// window has elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.lock().stats
    }

    /// Runs `operation` if the circuit admits it, bounded by the call timeout.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.try_acquire();
        if admission == Admission::Rejected {
            metrics::counter!("circuit_breaker_rejections_total", "breaker" => self.name)
                .increment(1);
            tracing::warn!(breaker = self.name, "circuit open, rejecting call");
            return Err(CircuitBreakerError::Open(self.name));
        }

        match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success(admission);
                Ok(value)
            }
            Ok(Err(error)) => {
                self.on_failure(admission);
                Err(CircuitBreakerError::Inner(error))
            }
            Err(_) => {
                self.on_failure(admission);
                Err(CircuitBreakerError::Timeout {
                    name: self.name,
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    /// Forces the breaker back to Closed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        tracing::info!(breaker = self.name, "circuit manually reset");
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.trials_in_flight = 0;
        inner.opened_at = None;
    }

    fn try_acquire(&self) -> Admission {
        let mut inner = self.lock();
        inner.stats.calls += 1;
        self.refresh(&mut inner);
        match inner.state {
            BreakerState::Closed => Admission::Admitted,
            BreakerState::HalfOpen
                if inner.trials_in_flight < self.config.half_open_successes.max(1) =>
            {
                inner.trials_in_flight += 1;
                Admission::Trial
            }
            BreakerState::HalfOpen | BreakerState::Open => {
                inner.stats.rejections += 1;
                Admission::Rejected
            }
        }
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state != BreakerState::Open {
            return;
        }
        let recovered = inner
            .opened_at
            .is_some_and(|opened| opened.elapsed() >= self.config.recovery_window);
        if recovered {
            tracing::info!(breaker = self.name, "circuit half-open, admitting trial calls");
            inner.state = BreakerState::HalfOpen;
            inner.half_open_successes = 0;
            inner.trials_in_flight = 0;
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        if admission == Admission::Trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
        inner.stats.successes += 1;
        inner.consecutive_failures = 0;

        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.half_open_successes {
                tracing::info!(breaker = self.name, "circuit closed");
                inner.state = BreakerState::Closed;
                inner.half_open_successes = 0;
                inner.opened_at = None;
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        if admission == Admission::Trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
        inner.stats.failures += 1;
        inner.consecutive_failures += 1;

        let trip = match inner.state {
            BreakerState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            BreakerState::HalfOpen => true,
            BreakerState::Open => false,
        };

        if trip {
            tracing::warn!(
                breaker = self.name,
                failures = inner.consecutive_failures,
                threshold = self.config.failure_threshold,
                "circuit opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            inner.half_open_successes = 0;
            inner.trials_in_flight = 0;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            call_timeout: Duration::from_millis(200),
            recovery_window: Duration::from_millis(50),
            half_open_successes: 1,
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.call_timeout, Duration::from_secs(1));
        assert_eq!(config.recovery_window, Duration::from_secs(5));
        assert_eq!(config.half_open_successes, 1);
    }

    #[tokio::test]
    async fn test_success_keeps_circuit_closed() {
        let breaker = CircuitBreaker::new("test", fast_config());

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;

        assert_eq!(result, Ok(42));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", fast_config());

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Closed);

        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new("test", fast_config());

        fail(&breaker).await;
        fail(&breaker).await;
        let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_calling() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        let attempts = AtomicUsize::new(0);
        let result = breaker
            .call(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        assert_eq!(result, Err(CircuitBreakerError::Open("test")));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().rejections, 1);
    }

    #[tokio::test]
    async fn test_half_open_success_closes_circuit() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let result = breaker.call(|| async { Ok::<_, &str>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_and_counts_as_failure() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            call_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let breaker = CircuitBreaker::new("slow", config);

        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, &str>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Timeout { .. })));
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_half_open_admits_bounded_trials() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let trial = breaker.call(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, &str>("trial")
        });
        let concurrent = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            breaker.call(|| async { Ok::<_, &str>("second") }).await
        };
        let (trial, concurrent) = tokio::join!(trial, concurrent);

        assert_eq!(trial, Ok("trial"));
        assert_eq!(concurrent, Err(CircuitBreakerError::Open("test")));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.stats().rejections, 1);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        breaker.reset();

        assert_eq!(breaker.state(), BreakerState::Closed);
        let result = breaker.call(|| async { Ok::<_, &str>(1) }).await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let breaker = CircuitBreaker::new("shared", fast_config());
        let clone = breaker.clone();
        for _ in 0..3 {
            fail(&clone).await;
        }

        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.stats().failures, 3);
    }
}
