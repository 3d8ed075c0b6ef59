//! Tells people about events they need to act on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::EquipmentId;
use events::{DomainEvent, EquipmentEvent, EventHandler, EventKind, HandlerError};

/// A message handed to the [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub equipment_id: Option<EquipmentId>,
    pub triggered_by: String,
}

/// Delivery channel for notifications (mail, chat, pager).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), HandlerError>;
}

/// Notifier that keeps sent messages in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures delivery to fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, notification: Notification) -> Result<(), HandlerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HandlerError::Unavailable("mail relay unreachable".to_string()));
        }
        self.lock().push(notification);
        Ok(())
    }
}

/// Sends a notification for deletions, validation failures and bulk results.
pub struct NotificationHandler {
    notifier: Arc<dyn Notifier>,
}

impl NotificationHandler {
    pub const KINDS: [EventKind; 3] = [
        EventKind::Deleted,
        EventKind::ValidationFailed,
        EventKind::BulkOperationCompleted,
    ];

    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    fn compose(event: &DomainEvent) -> Option<(String, String)> {
        match event.payload() {
            EquipmentEvent::Deleted(data) => Some((
                format!("Equipment {} removed", data.equipment_id),
                format!(
                    "Equipment {} was deleted by {}.",
                    data.equipment_id,
                    event.triggered_by()
                ),
            )),
            EquipmentEvent::ValidationFailed(data) => Some((
                "Equipment submission rejected".to_string(),
                format!("Validation failed: {}", data.errors.join("; ")),
            )),
            EquipmentEvent::BulkOperationCompleted(data) => Some((
                format!("Bulk {} finished", data.operation),
                format!(
                    "{} succeeded, {} failed.",
                    data.succeeded, data.failed
                ),
            )),
            EquipmentEvent::Created(_) | EquipmentEvent::Updated(_) => None,
        }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let Some((subject, body)) = Self::compose(event) else {
            return Ok(());
        };

        self.notifier
            .send(Notification {
                subject,
                body,
                equipment_id: event.payload().equipment_id(),
                triggered_by: event.triggered_by().to_string(),
            })
            .await
    }
}
