use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::EquipmentId;
use equipment::{EquipmentRepository, NewEquipment};
use events::EquipmentEvent;

use crate::error::OperationError;
use crate::operation::{
    CompensatableOperation, OperationContext, OperationLifecycle, OperationOutput,
};
use crate::state::OperationState;

/// Inserts a new record. Compensation deletes the record it inserted.
pub struct AddEquipment {
    repository: Arc<dyn EquipmentRepository>,
    record: NewEquipment,
    lifecycle: OperationLifecycle,
    assigned_id: Option<EquipmentId>,
}

impl AddEquipment {
    pub fn new(repository: Arc<dyn EquipmentRepository>, record: NewEquipment) -> Self {
        Self {
            repository,
            record,
            lifecycle: OperationLifecycle::new(),
            assigned_id: None,
        }
    }

    /// The ID the store assigned, once the insert has succeeded.
    pub fn assigned_id(&self) -> Option<EquipmentId> {
        self.assigned_id
    }

    pub fn record(&self) -> &NewEquipment {
        &self.record
    }
}

impl fmt::Debug for AddEquipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddEquipment")
            .field("record", &self.record)
            .field("state", &self.lifecycle.state())
            .field("assigned_id", &self.assigned_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompensatableOperation for AddEquipment {
    fn name(&self) -> &str {
        "AddEquipment"
    }

    fn state(&self) -> OperationState {
        self.lifecycle.state()
    }

    async fn execute(&mut self, _ctx: &OperationContext) -> Result<OperationOutput, OperationError> {
        self.lifecycle.begin_execute()?;
        let outcome = self
            .repository
            .insert(self.record.clone())
            .await
            .map_err(OperationError::from);
        let id = self.lifecycle.finish_execute(outcome)?;

        self.assigned_id = Some(id);
        tracing::debug!(equipment_id = %id, "equipment inserted");
        Ok(OperationOutput::Inserted(id))
    }

    async fn compensate(&mut self, _ctx: &OperationContext) -> Result<(), OperationError> {
        self.lifecycle.begin_compensate()?;
        let outcome = match self.assigned_id {
            Some(id) => self.repository.delete(id).await.map_err(OperationError::from),
            None => Err(OperationError::Failed(
                "no inserted record to delete".to_string(),
            )),
        };
        self.lifecycle.finish_compensate(outcome)
    }

    fn completion_event(&self) -> Option<EquipmentEvent> {
        let id = self.assigned_id?;
        Some(EquipmentEvent::created(
            id,
            self.record.name.clone(),
            self.record.serial_number.clone(),
            self.record.sequence_number,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equipment::{InMemoryEquipmentRepository, RepositoryError};

    fn add(repo: &InMemoryEquipmentRepository) -> AddEquipment {
        AddEquipment::new(Arc::new(repo.clone()), NewEquipment::new("Drill", "D-1"))
    }

    #[tokio::test]
    async fn test_execute_captures_assigned_id() {
        let repo = InMemoryEquipmentRepository::starting_at(500);
        let mut op = add(&repo);
        let ctx = OperationContext::new("tester");

        let output = op.execute(&ctx).await.unwrap();

        assert_eq!(output, OperationOutput::Inserted(EquipmentId::new(500)));
        assert_eq!(op.assigned_id(), Some(EquipmentId::new(500)));
        assert_eq!(op.state(), OperationState::Completed);
    }

    #[tokio::test]
    async fn test_compensate_deletes_inserted_record() {
        let repo = InMemoryEquipmentRepository::starting_at(500);
        let mut op = add(&repo);
        let ctx = OperationContext::new("tester");
        op.execute(&ctx).await.unwrap();

        op.compensate(&ctx).await.unwrap();

        assert_eq!(op.state(), OperationState::Compensated);
        assert_eq!(repo.deleted_ids(), vec![EquipmentId::new(500)]);
        assert_eq!(repo.record_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_nothing_to_compensate() {
        let repo = InMemoryEquipmentRepository::new();
        repo.set_fail_on_insert(true);
        let mut op = add(&repo);
        let ctx = OperationContext::new("tester");

        let result = op.execute(&ctx).await;

        assert!(matches!(
            result,
            Err(OperationError::Repository(RepositoryError::Rejected(_)))
        ));
        assert_eq!(op.state(), OperationState::Failed);
        assert!(op.completion_event().is_none());

        let result = op.compensate(&ctx).await;
        assert!(matches!(result, Err(OperationError::InvalidState { .. })));
        assert!(repo.deleted_ids().is_empty());
    }

    #[tokio::test]
    async fn test_compensate_before_execute_is_rejected() {
        let repo = InMemoryEquipmentRepository::new();
        let mut op = add(&repo);

        let result = op.compensate(&OperationContext::new("tester")).await;

        assert_eq!(
            result,
            Err(OperationError::InvalidState {
                expected: OperationState::Completed,
                actual: OperationState::Pending,
            })
        );
        assert_eq!(op.state(), OperationState::Pending);
    }

    #[tokio::test]
    async fn test_compensation_failure_is_terminal() {
        let repo = InMemoryEquipmentRepository::new();
        let mut op = add(&repo);
        let ctx = OperationContext::new("tester");
        op.execute(&ctx).await.unwrap();
        repo.set_fail_on_delete(true);

        assert!(op.compensate(&ctx).await.is_err());
        assert_eq!(op.state(), OperationState::CompensationFailed);
        assert!(matches!(
            op.compensate(&ctx).await,
            Err(OperationError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_completion_event_describes_insert() {
        let repo = InMemoryEquipmentRepository::starting_at(3);
        let mut op = add(&repo);
        op.execute(&OperationContext::new("tester")).await.unwrap();

        let event = op.completion_event().unwrap();

        assert_eq!(event, EquipmentEvent::created(EquipmentId::new(3), "Drill", "D-1", None));
    }
}
