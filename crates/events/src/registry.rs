//! Type-keyed table of subscribed handlers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::event::EventKind;
use crate::handler::EventHandler;

/// Immutable snapshot of the handlers registered for one kind.
pub type HandlerSet = Arc<[Arc<dyn EventHandler>]>;

/// Maps each [`EventKind`] to the set of handlers subscribed to it.
///
/// Writes replace the per-kind slice wholesale (copy-on-write), so a reader
/// only holds the lock long enough to clone an `Arc` and never while a
/// handler runs. Handler identity is the address of its `Arc` allocation.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventKind, HandlerSet>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` to the set for `kind`.
    ///
    /// Returns false, leaving the registry unchanged, if this handler instance
    /// is already registered for `kind`.
    pub fn register(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);

        let current = handlers.get(&kind).map(|set| set.as_ref()).unwrap_or(&[]);
        if current.iter().any(|existing| same_handler(existing, &handler)) {
            return false;
        }

        let mut next = current.to_vec();
        next.push(handler);
        handlers.insert(kind, next.into());
        true
    }

    /// Removes `handler` from the set for `kind`.
    ///
    /// Returns false if it was not registered; that is not an error.
    pub fn unregister(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);

        let Some(current) = handlers.get(&kind) else {
            return false;
        };

        let next: Vec<_> = current
            .iter()
            .filter(|existing| !same_handler(existing, handler))
            .cloned()
            .collect();

        if next.len() == current.len() {
            return false;
        }

        if next.is_empty() {
            handlers.remove(&kind);
        } else {
            handlers.insert(kind, next.into());
        }
        true
    }

    /// Returns the handlers registered for `kind` at this instant.
    pub fn snapshot(&self, kind: EventKind) -> HandlerSet {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Returns the number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).map_or(0, |set| set.len())
    }

    /// Returns true if this handler instance is registered for `kind`.
    pub fn is_registered(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> bool {
        self.snapshot(kind)
            .iter()
            .any(|existing| same_handler(existing, handler))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = f.debug_map();
        for (kind, set) in handlers.iter() {
            let names: Vec<_> = set.iter().map(|h| h.name()).collect();
            map.entry(kind, &names);
        }
        map.finish()
    }
}

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
