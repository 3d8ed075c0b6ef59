use chrono::{DateTime, Utc};
use common::{ActorId, CorrelationId, EquipmentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EventError;

/// Envelope schema version stamped on every event built by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Stable tag for the concrete kind of an event.
///
/// Handlers are registered per kind; the dispatcher resolves handlers by the
/// kind of the payload being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    ValidationFailed,
    BulkOperationCompleted,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::Deleted,
        EventKind::ValidationFailed,
        EventKind::BulkOperationCompleted,
    ];

    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "EquipmentCreated",
            EventKind::Updated => "EquipmentUpdated",
            EventKind::Deleted => "EquipmentDeleted",
            EventKind::ValidationFailed => "EquipmentValidationFailed",
            EventKind::BulkOperationCompleted => "BulkOperationCompleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of an equipment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EquipmentEvent {
    /// A record was added or deployed.
    Created(EquipmentCreated),

    /// An existing record was modified.
    Updated(EquipmentUpdated),

    /// A record was removed.
    Deleted(EquipmentDeleted),

    /// A command was rejected because the submitted record was invalid.
    ValidationFailed(ValidationFailed),

    /// A multi-record operation finished.
    BulkOperationCompleted(BulkOperationCompleted),
}

impl EquipmentEvent {
    /// Returns the kind tag for this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            EquipmentEvent::Created(_) => EventKind::Created,
            EquipmentEvent::Updated(_) => EventKind::Updated,
            EquipmentEvent::Deleted(_) => EventKind::Deleted,
            EquipmentEvent::ValidationFailed(_) => EventKind::ValidationFailed,
            EquipmentEvent::BulkOperationCompleted(_) => EventKind::BulkOperationCompleted,
        }
    }

    /// Returns the record this event is about, if it concerns a single record.
    pub fn equipment_id(&self) -> Option<EquipmentId> {
        match self {
            EquipmentEvent::Created(data) => Some(data.equipment_id),
            EquipmentEvent::Updated(data) => Some(data.equipment_id),
            EquipmentEvent::Deleted(data) => Some(data.equipment_id),
            EquipmentEvent::ValidationFailed(data) => data.equipment_id,
            EquipmentEvent::BulkOperationCompleted(_) => None,
        }
    }
}

/// Data for the Created event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentCreated {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub serial_number: String,
    /// Deployment sequence number, set when the record was deployed.
    pub sequence_number: Option<i64>,
}

/// Data for the Updated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentUpdated {
    pub equipment_id: EquipmentId,
    /// Names of the fields whose values changed.
    pub changed_fields: Vec<String>,
}

/// Data for the Deleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentDeleted {
    pub equipment_id: EquipmentId,
}

/// Data for the ValidationFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailed {
    /// Present when an existing record was the target of the command.
    pub equipment_id: Option<EquipmentId>,
    pub errors: Vec<String>,
}

/// Data for the BulkOperationCompleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOperationCompleted {
    pub operation: String,
    pub equipment_ids: Vec<EquipmentId>,
    pub succeeded: usize,
    pub failed: usize,
}

// Convenience constructors

impl EquipmentEvent {
    pub fn created(
        equipment_id: EquipmentId,
        name: impl Into<String>,
        serial_number: impl Into<String>,
        sequence_number: Option<i64>,
    ) -> Self {
        EquipmentEvent::Created(EquipmentCreated {
            equipment_id,
            name: name.into(),
            serial_number: serial_number.into(),
            sequence_number,
        })
    }

    pub fn updated(equipment_id: EquipmentId, changed_fields: Vec<String>) -> Self {
        EquipmentEvent::Updated(EquipmentUpdated {
            equipment_id,
            changed_fields,
        })
    }

    pub fn deleted(equipment_id: EquipmentId) -> Self {
        EquipmentEvent::Deleted(EquipmentDeleted { equipment_id })
    }

    pub fn validation_failed(equipment_id: Option<EquipmentId>, errors: Vec<String>) -> Self {
        EquipmentEvent::ValidationFailed(ValidationFailed {
            equipment_id,
            errors,
        })
    }

    pub fn bulk_operation_completed(
        operation: impl Into<String>,
        equipment_ids: Vec<EquipmentId>,
        failed: usize,
    ) -> Self {
        EquipmentEvent::BulkOperationCompleted(BulkOperationCompleted {
            operation: operation.into(),
            succeeded: equipment_ids.len(),
            equipment_ids,
            failed,
        })
    }
}

/// An immutable domain event: envelope metadata plus a kind-specific payload.
///
/// Events are built by the command layer and consumed by handlers. Fields are
/// only reachable through accessors so a published event cannot be altered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    event_id: EventId,
    occurred_at: DateTime<Utc>,
    schema_version: u32,
    triggered_by: ActorId,
    correlation_id: Option<CorrelationId>,
    payload: EquipmentEvent,
}

impl DomainEvent {
    /// Builds an event with a fresh ID and the current time.
    pub fn new(payload: EquipmentEvent, triggered_by: ActorId) -> Result<Self, EventError> {
        Self::builder(payload).triggered_by(triggered_by).build()
    }

    /// Creates a new event builder for the given payload.
    pub fn builder(payload: EquipmentEvent) -> DomainEventBuilder {
        DomainEventBuilder {
            payload,
            event_id: None,
            occurred_at: None,
            triggered_by: None,
            correlation_id: None,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn triggered_by(&self) -> &ActorId {
        &self.triggered_by
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    pub fn payload(&self) -> &EquipmentEvent {
        &self.payload
    }

    /// Returns the kind tag of the payload.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Builder for constructing domain events.
#[derive(Debug)]
pub struct DomainEventBuilder {
    payload: EquipmentEvent,
    event_id: Option<EventId>,
    occurred_at: Option<DateTime<Utc>>,
    triggered_by: Option<ActorId>,
    correlation_id: Option<CorrelationId>,
}

impl DomainEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Sets the actor that triggered the event.
    pub fn triggered_by(mut self, actor: impl Into<ActorId>) -> Self {
        self.triggered_by = Some(actor.into());
        self
    }

    /// Sets the correlation ID.
    pub fn correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Sets the correlation ID when one is present.
    pub fn maybe_correlation_id(mut self, correlation_id: Option<CorrelationId>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Builds the event.
    ///
    /// Fails with [`EventError::MissingActor`] if no actor was given or the
    /// actor identity is blank.
    pub fn build(self) -> Result<DomainEvent, EventError> {
        let triggered_by = self
            .triggered_by
            .filter(|actor| !actor.is_blank())
            .ok_or(EventError::MissingActor)?;

        Ok(DomainEvent {
            event_id: self.event_id.unwrap_or_default(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            schema_version: SCHEMA_VERSION,
            triggered_by,
            correlation_id: self.correlation_id,
            payload: self.payload,
        })
    }
}
