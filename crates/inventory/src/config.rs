//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use resilience::{CircuitBreakerConfig, RetryPolicy};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Inventory configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `INVENTORY_SYSTEM_ACTOR`: actor recorded on events raised by the system itself (default: `"system"`)
/// - `INVENTORY_BREAKER_FAILURE_THRESHOLD` (default: `5`)
/// - `INVENTORY_BREAKER_CALL_TIMEOUT_MS` (default: `1000`)
/// - `INVENTORY_BREAKER_RECOVERY_WINDOW_MS` (default: `5000`)
/// - `INVENTORY_BREAKER_HALF_OPEN_SUCCESSES` (default: `1`)
/// - `INVENTORY_RETRY_MAX_RETRIES` (default: `3`)
/// - `INVENTORY_RETRY_INITIAL_DELAY_MS` (default: `100`)
/// - `INVENTORY_RETRY_MAX_DELAY_MS` (default: `2000`)
/// - `INVENTORY_RETRY_MULTIPLIER` (default: `2.0`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub system_actor: String,
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            system_actor: std::env::var("INVENTORY_SYSTEM_ACTOR")
                .ok()
                .filter(|actor| !actor.trim().is_empty())
                .unwrap_or(defaults.system_actor),
            breaker: CircuitBreakerConfig {
                failure_threshold: env_or(
                    "INVENTORY_BREAKER_FAILURE_THRESHOLD",
                    defaults.breaker.failure_threshold,
                ),
                call_timeout: env_millis(
                    "INVENTORY_BREAKER_CALL_TIMEOUT_MS",
                    defaults.breaker.call_timeout,
                ),
                recovery_window: env_millis(
                    "INVENTORY_BREAKER_RECOVERY_WINDOW_MS",
                    defaults.breaker.recovery_window,
                ),
                half_open_successes: env_or(
                    "INVENTORY_BREAKER_HALF_OPEN_SUCCESSES",
                    defaults.breaker.half_open_successes,
                ),
            },
            retry: RetryPolicy {
                max_retries: env_or("INVENTORY_RETRY_MAX_RETRIES", defaults.retry.max_retries),
                initial_delay: env_millis(
                    "INVENTORY_RETRY_INITIAL_DELAY_MS",
                    defaults.retry.initial_delay,
                ),
                max_delay: env_millis("INVENTORY_RETRY_MAX_DELAY_MS", defaults.retry.max_delay),
                multiplier: env_or("INVENTORY_RETRY_MULTIPLIER", defaults.retry.multiplier),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            system_actor: "system".to_string(),
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
