//! Event error types.

use thiserror::Error;

/// Errors raised while constructing an event envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// Every event must name the actor that triggered it.
    #[error("Event is missing the triggering actor")]
    MissingActor,
}

/// Errors a subscriber reports from [`EventHandler::handle`](crate::EventHandler::handle).
///
/// The dispatcher logs and counts these; they never reach the publisher.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not complete its side effect.
    #[error("Handler failed: {0}")]
    Failed(String),

    /// A collaborator the handler depends on is unavailable.
    #[error("Handler dependency unavailable: {0}")]
    Unavailable(String),

    /// The event could not be serialized for the handler's sink.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
