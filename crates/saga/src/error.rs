//! Saga error types.

use equipment::RepositoryError;
use events::EventError;
use thiserror::Error;

use crate::state::OperationState;

/// Errors raised by a single operation's execute or compensate action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    /// The persistence collaborator failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The operation is not in a state that allows the requested action.
    #[error("Invalid operation state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: OperationState,
        actual: OperationState,
    },

    /// An earlier step this operation depends on produced no equipment ID.
    #[error("Step {step} produced no equipment id to act on")]
    UnresolvedReference { step: usize },

    /// The saga was cancelled before this step started.
    #[error("Operation cancelled")]
    Cancelled,

    /// A step-specific failure.
    #[error("Operation failed: {0}")]
    Failed(String),
}

/// Errors that abort a saga run instead of being reported in its result.
///
/// Expected failures (a step failing, a rollback failing) are never returned
/// here; they are described by the [`SagaResult`](crate::SagaResult).
#[derive(Debug, Error)]
pub enum SagaError {
    /// An operation broke the execute/compensate contract.
    #[error("Contract violation at step {step} ('{name}'): {reason}")]
    ContractViolation {
        step: usize,
        name: String,
        reason: String,
    },

    /// Completion events need an actor and none was supplied.
    #[error("Saga requires a triggering actor")]
    MissingActor,

    /// A completion event could not be built.
    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
