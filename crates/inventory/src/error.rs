//! Command error types.

use equipment::RepositoryError;
use events::EventError;
use saga::{OperationError, SagaError};
use thiserror::Error;

/// Errors returned by [`EquipmentCommands`](crate::EquipmentCommands).
#[derive(Debug, Error)]
pub enum CommandError {
    /// The submitted record is missing required fields.
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// The persistence collaborator failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A multi-step command failed and was rolled back.
    #[error("Step {step} ('{operation}') failed: {error}")]
    SagaFailed {
        step: usize,
        operation: String,
        error: OperationError,
        /// Rollbacks that did not succeed and need manual intervention.
        compensation_failures: usize,
    },

    /// The caller cancelled the command before it wrote anything.
    #[error("Command cancelled")]
    Cancelled,

    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

pub type Result<T> = std::result::Result<T, CommandError>;
