//! Drops cached query results that an event made stale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::EquipmentId;
use events::{DomainEvent, EquipmentEvent, EventHandler, EventKind, HandlerError};

/// Key under which the equipment list query is cached.
pub const LIST_KEY: &str = "equipment:list";

/// Key under which a single record's query is cached.
pub fn record_key(id: EquipmentId) -> String {
    format!("equipment:{id}")
}

/// Query result cache the handler invalidates.
pub trait QueryCache: Send + Sync {
    /// Removes `key`. Returns true if it was present.
    fn invalidate(&self, key: &str) -> bool;
}

/// In-memory query cache for tests and local runs.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueryCache {
    entries: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl InMemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        self.lock().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, serde_json::Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryCache for InMemoryQueryCache {
    fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }
}

/// Invalidates the list entry and the entries of every record an event touched.
pub struct CacheInvalidationHandler {
    cache: Arc<dyn QueryCache>,
}

impl CacheInvalidationHandler {
    /// Event kinds that change what queries return.
    pub const KINDS: [EventKind; 4] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::Deleted,
        EventKind::BulkOperationCompleted,
    ];

    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventHandler for CacheInvalidationHandler {
    fn name(&self) -> &'static str {
        "cache_invalidation"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let ids = match event.payload() {
            EquipmentEvent::BulkOperationCompleted(bulk) => bulk.equipment_ids.clone(),
            payload => payload.equipment_id().into_iter().collect(),
        };

        let mut invalidated = usize::from(self.cache.invalidate(LIST_KEY));
        for id in ids {
            invalidated += usize::from(self.cache.invalidate(&record_key(id)));
        }

        tracing::debug!(kind = %event.kind(), invalidated, "cache entries invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(payload: EquipmentEvent) -> DomainEvent {
        DomainEvent::builder(payload)
            .triggered_by("tester")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_invalidates_list_and_record() {
        let cache = InMemoryQueryCache::new();
        cache.put(LIST_KEY, json!([1, 2]));
        cache.put(record_key(EquipmentId::new(1)), json!({"id": 1}));
        cache.put(record_key(EquipmentId::new(2)), json!({"id": 2}));
        let handler = CacheInvalidationHandler::new(Arc::new(cache.clone()));

        handler
            .handle(&event(EquipmentEvent::updated(
                EquipmentId::new(1),
                vec!["name".into()],
            )))
            .await
            .unwrap();

        assert!(!cache.contains(LIST_KEY));
        assert!(!cache.contains(&record_key(EquipmentId::new(1))));
        assert!(cache.contains(&record_key(EquipmentId::new(2))));
    }

    #[tokio::test]
    async fn test_bulk_invalidates_every_listed_record() {
        let cache = InMemoryQueryCache::new();
        for id in 1..=3 {
            cache.put(record_key(EquipmentId::new(id)), json!(id));
        }
        let handler = CacheInvalidationHandler::new(Arc::new(cache.clone()));

        handler
            .handle(&event(EquipmentEvent::bulk_operation_completed(
                "bulk_add",
                vec![EquipmentId::new(1), EquipmentId::new(3)],
                0,
            )))
            .await
            .unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&record_key(EquipmentId::new(2))), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_missing_entries_are_not_an_error() {
        let cache = InMemoryQueryCache::new();
        let handler = CacheInvalidationHandler::new(Arc::new(cache.clone()));

        let result = handler
            .handle(&event(EquipmentEvent::deleted(EquipmentId::new(9))))
            .await;

        assert!(result.is_ok());
        assert!(cache.is_empty());
    }
}
