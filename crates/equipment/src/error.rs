//! Repository error types.

use common::EquipmentId;
use resilience::CircuitBreakerError;
use thiserror::Error;

/// Errors reported by the persistence layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// No record exists with the given ID.
    #[error("Equipment not found: {0}")]
    NotFound(EquipmentId),

    /// The write conflicts with existing data (e.g. a duplicate serial number).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store rejected the request outright.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The store could not be reached.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time.
    #[error("Repository call timed out: {0}")]
    Timeout(String),

    /// The circuit breaker in front of the store is open.
    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),
}

impl RepositoryError {
    /// Returns true for failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::Unavailable(_) | RepositoryError::Timeout(_)
        )
    }

    /// Returns true when the request is known not to have reached the store.
    ///
    /// A timeout does not qualify: the store may have applied the write
    /// after the caller stopped waiting.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

impl From<CircuitBreakerError<RepositoryError>> for RepositoryError {
    fn from(error: CircuitBreakerError<RepositoryError>) -> Self {
        match error {
            CircuitBreakerError::Open(name) => RepositoryError::CircuitOpen(name.to_string()),
            CircuitBreakerError::Timeout { name, timeout } => {
                RepositoryError::Timeout(format!("{name} after {timeout:?}"))
            }
            CircuitBreakerError::Inner(inner) => inner,
        }
    }
}

/// Convenience type alias for repository results.
pub type Result<T> = std::result::Result<T, RepositoryError>;
