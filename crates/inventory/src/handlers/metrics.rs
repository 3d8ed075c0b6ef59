//! Records equipment activity as metrics.

use async_trait::async_trait;
use events::{DomainEvent, EquipmentEvent, EventHandler, HandlerError};

/// Counts events by kind and tracks bulk operation sizes.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsHandler;

impl MetricsHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for MetricsHandler {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        metrics::counter!("equipment_events_total", "kind" => event.kind().as_str()).increment(1);

        match event.payload() {
            EquipmentEvent::ValidationFailed(data) => {
                metrics::counter!("equipment_validation_errors_total")
                    .increment(data.errors.len() as u64);
            }
            EquipmentEvent::BulkOperationCompleted(data) => {
                metrics::histogram!("equipment_bulk_operation_size", "operation" => data.operation.clone())
                    .record((data.succeeded + data.failed) as f64);
                if data.failed > 0 {
                    metrics::counter!("equipment_bulk_failures_total", "operation" => data.operation.clone())
                        .increment(data.failed as u64);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
