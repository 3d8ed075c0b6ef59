//! Failure-containment policies for calls that leave the process.
//!
//! - [`CircuitBreaker`] stops calling a collaborator that keeps failing and
//!   probes it again after a recovery window.
//! - [`RetryPolicy`] retries transient failures with capped exponential
//!   backoff.
//!
//! Both are plain values configured at assembly time; nothing here is global.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats,
};
pub use retry::RetryPolicy;
