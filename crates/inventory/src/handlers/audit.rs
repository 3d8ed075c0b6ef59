//! Appends every event to the audit trail as a JSON entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CorrelationId, EquipmentId};
use events::{DomainEvent, EventHandler, EventId, HandlerError};
use serde::{Deserialize, Serialize};

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_id: EventId,
    pub kind: String,
    pub equipment_id: Option<EquipmentId>,
    pub actor: String,
    pub correlation_id: Option<CorrelationId>,
    pub occurred_at: DateTime<Utc>,
    pub schema_version: u32,
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn from_event(event: &DomainEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: event.event_id(),
            kind: event.kind().as_str().to_string(),
            equipment_id: event.payload().equipment_id(),
            actor: event.triggered_by().to_string(),
            correlation_id: event.correlation_id(),
            occurred_at: event.occurred_at(),
            schema_version: event.schema_version(),
            details: serde_json::to_value(event.payload())?,
        })
    }
}

/// Destination of audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: serde_json::Value) -> Result<(), HandlerError>;
}

/// In-memory audit sink for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    entries: Arc<Mutex<Vec<serde_json::Value>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures appends to fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<serde_json::Value> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<serde_json::Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: serde_json::Value) -> Result<(), HandlerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HandlerError::Unavailable("audit store offline".to_string()));
        }
        self.lock().push(entry);
        Ok(())
    }
}

/// Writes an [`AuditEntry`] for each event it receives.
pub struct AuditLogHandler {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogHandler {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl EventHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let entry = serde_json::to_value(AuditEntry::from_event(event)?)?;
        self.sink.append(entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::EquipmentEvent;

    #[tokio::test]
    async fn test_entry_captures_envelope_and_payload() {
        let sink = InMemoryAuditSink::new();
        let handler = AuditLogHandler::new(Arc::new(sink.clone()));
        let correlation_id = CorrelationId::new();
        let event = DomainEvent::builder(EquipmentEvent::created(
            EquipmentId::new(8),
            "Scissor lift",
            "SL-8",
            None,
        ))
        .triggered_by("auditor")
        .correlation_id(correlation_id)
        .build()
        .unwrap();

        handler.handle(&event).await.unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        let entry: AuditEntry = serde_json::from_value(entries[0].clone()).unwrap();
        assert_eq!(entry.event_id, event.event_id());
        assert_eq!(entry.kind, "EquipmentCreated");
        assert_eq!(entry.equipment_id, Some(EquipmentId::new(8)));
        assert_eq!(entry.actor, "auditor");
        assert_eq!(entry.correlation_id, Some(correlation_id));
        assert_eq!(entry.details["data"]["serial_number"], "SL-8");
    }

    #[tokio::test]
    async fn test_sink_failure_is_reported() {
        let sink = InMemoryAuditSink::new();
        sink.set_fail(true);
        let handler = AuditLogHandler::new(Arc::new(sink.clone()));
        let event = DomainEvent::builder(EquipmentEvent::deleted(EquipmentId::new(1)))
            .triggered_by("auditor")
            .build()
            .unwrap();

        let result = handler.handle(&event).await;

        assert!(matches!(result, Err(HandlerError::Unavailable(_))));
        assert!(sink.is_empty());
    }
}
