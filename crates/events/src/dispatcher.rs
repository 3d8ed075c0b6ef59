//! Concurrent event dispatcher.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::task::{self, JoinError, JoinSet};

use crate::event::{DomainEvent, EventId, EventKind};
use crate::handler::EventHandler;
use crate::registry::HandlerRegistry;

/// A handler that did not complete normally for a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Name reported by the handler.
    pub handler: &'static str,
    /// Rendered error or panic message.
    pub error: String,
    /// True if the handler panicked rather than returning an error.
    pub panicked: bool,
}

/// Outcome of publishing one event.
///
/// Publishing never fails; handler failures are reported here instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub event_id: EventId,
    pub kind: EventKind,
    /// Number of handlers the event was delivered to.
    pub handlers_invoked: usize,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    /// Returns true if every invoked handler completed normally.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the number of handlers that completed normally.
    pub fn succeeded(&self) -> usize {
        self.handlers_invoked - self.failures.len()
    }
}

/// Publishes events to the handlers registered for their kind.
///
/// Every handler for an event runs as its own task; `publish` waits for all
/// of them. A handler that errors or panics is logged and reported without
/// affecting the others. Cloning a dispatcher shares its registry.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<HandlerRegistry>,
}

impl EventDispatcher {
    /// Creates a dispatcher with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to events of `kind`. Registering the same
    /// instance twice has no further effect.
    pub fn register(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> bool {
        let added = self.registry.register(kind, Arc::clone(&handler));
        if added {
            tracing::debug!(%kind, handler = handler.name(), "event handler registered");
        }
        added
    }

    /// Subscribes `handler` to each of `kinds`.
    pub fn register_all(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) {
        for kind in kinds {
            self.register(*kind, Arc::clone(&handler));
        }
    }

    /// Unsubscribes `handler` from `kind`. Unknown handlers are ignored.
    pub fn unregister(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> bool {
        let removed = self.registry.unregister(kind, handler);
        if removed {
            tracing::debug!(%kind, handler = handler.name(), "event handler unregistered");
        }
        removed
    }

    /// Returns the number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry.handler_count(kind)
    }

    /// Returns true if this handler instance is registered for `kind`.
    pub fn is_registered(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> bool {
        self.registry.is_registered(kind, handler)
    }

    /// Delivers `event` to every handler registered for its kind and waits
    /// for all of them to finish.
    #[tracing::instrument(
        skip(self, event),
        fields(event_id = tracing::field::Empty, kind = tracing::field::Empty)
    )]
    pub async fn publish(&self, event: impl Into<Arc<DomainEvent>>) -> PublishReport {
        let event: Arc<DomainEvent> = event.into();
        let kind = event.kind();
        let event_id = event.event_id();

        let span = tracing::Span::current();
        span.record("event_id", tracing::field::display(event_id));
        span.record("kind", kind.as_str());

        let handlers = self.registry.snapshot(kind);
        if handlers.is_empty() {
            tracing::debug!("no handlers registered for event kind");
            return PublishReport {
                event_id,
                kind,
                handlers_invoked: 0,
                failures: Vec::new(),
            };
        }

        metrics::counter!("events_published_total", "kind" => kind.as_str()).increment(1);

        let mut tasks = JoinSet::new();
        let mut names = HashMap::with_capacity(handlers.len());
        for handler in handlers.iter() {
            let handler = Arc::clone(handler);
            let event = Arc::clone(&event);
            let name = handler.name();
            let abort = tasks.spawn(async move {
                let outcome = AssertUnwindSafe(handler.handle(&event))
                    .catch_unwind()
                    .await;
                (name, outcome)
            });
            names.insert(abort.id(), name);
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((_, Ok(Ok(())))) => continue,
                Ok((name, Ok(Err(error)))) => {
                    tracing::warn!(handler = name, error = %error, "event handler failed");
                    HandlerFailure {
                        handler: name,
                        error: error.to_string(),
                        panicked: false,
                    }
                }
                Ok((name, Err(panic))) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(handler = name, panic = %message, "event handler panicked");
                    HandlerFailure {
                        handler: name,
                        error: message,
                        panicked: true,
                    }
                }
                // Only reachable if the runtime is shutting down underneath us.
                Err(join_error) => unfinished_task_failure(join_error, &names),
            };
            metrics::counter!(
                "event_handler_failures_total",
                "kind" => kind.as_str(),
                "handler" => failure.handler
            )
            .increment(1);
            failures.push(failure);
        }

        tracing::debug!(
            handlers = handlers.len(),
            failed = failures.len(),
            "event published"
        );

        PublishReport {
            event_id,
            kind,
            handlers_invoked: handlers.len(),
            failures,
        }
    }

    /// Publishes each event independently and returns once every one of them
    /// has finished its own fan-out. Reports are returned in input order.
    pub async fn publish_batch<I>(&self, events: I) -> Vec<PublishReport>
    where
        I: IntoIterator,
        I::Item: Into<Arc<DomainEvent>>,
    {
        join_all(events.into_iter().map(|event| self.publish(event))).await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Describes a handler task that ended without producing an outcome.
fn unfinished_task_failure(
    join_error: JoinError,
    names: &HashMap<task::Id, &'static str>,
) -> HandlerFailure {
    let handler = names.get(&join_error.id()).copied().unwrap_or("unknown");
    tracing::error!(handler, error = %join_error, "event handler task did not complete");
    HandlerFailure {
        handler,
        error: join_error.to_string(),
        panicked: join_error.is_panic(),
    }
}
