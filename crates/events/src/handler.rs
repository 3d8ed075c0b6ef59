//! Subscriber capability.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::event::DomainEvent;

/// A subscriber that reacts to published events.
///
/// One handler instance may be registered for several [`EventKind`](crate::EventKind)s
/// and inspect the payload to tell them apart. Handlers run concurrently with
/// every other handler for the same event, so they must not rely on ordering.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Handles a single event.
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}
