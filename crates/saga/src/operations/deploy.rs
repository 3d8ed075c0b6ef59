use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::EquipmentId;
use equipment::{EquipmentRepository, NewEquipment, SequenceGenerator};
use events::EquipmentEvent;

use crate::error::OperationError;
use crate::operation::{
    CompensatableOperation, OperationContext, OperationLifecycle, OperationOutput,
};
use crate::state::OperationState;

/// Assigns the next deployment sequence number to a record and inserts it.
///
/// Compensation deletes the inserted record. The sequence number stays
/// consumed; the generator never hands it out again.
pub struct DeployEquipment {
    repository: Arc<dyn EquipmentRepository>,
    sequence: Arc<dyn SequenceGenerator>,
    record: NewEquipment,
    lifecycle: OperationLifecycle,
    deployed: Option<(EquipmentId, i64)>,
}

impl DeployEquipment {
    pub fn new(
        repository: Arc<dyn EquipmentRepository>,
        sequence: Arc<dyn SequenceGenerator>,
        record: NewEquipment,
    ) -> Self {
        Self {
            repository,
            sequence,
            record,
            lifecycle: OperationLifecycle::new(),
            deployed: None,
        }
    }

    pub fn assigned_id(&self) -> Option<EquipmentId> {
        self.deployed.map(|(id, _)| id)
    }

    pub fn sequence_number(&self) -> Option<i64> {
        self.deployed.map(|(_, sequence_number)| sequence_number)
    }

    async fn deploy(&self) -> Result<(EquipmentId, i64), OperationError> {
        let sequence_number = self.sequence.next_sequence().await?;
        let mut record = self.record.clone();
        record.sequence_number = Some(sequence_number);
        let id = self.repository.insert(record).await?;
        Ok((id, sequence_number))
    }
}

impl fmt::Debug for DeployEquipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployEquipment")
            .field("record", &self.record)
            .field("state", &self.lifecycle.state())
            .field("deployed", &self.deployed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompensatableOperation for DeployEquipment {
    fn name(&self) -> &str {
        "DeployEquipment"
    }

    fn state(&self) -> OperationState {
        self.lifecycle.state()
    }

    async fn execute(&mut self, _ctx: &OperationContext) -> Result<OperationOutput, OperationError> {
        self.lifecycle.begin_execute()?;
        let outcome = self.deploy().await;
        let (id, sequence_number) = self.lifecycle.finish_execute(outcome)?;

        self.deployed = Some((id, sequence_number));
        tracing::debug!(equipment_id = %id, sequence_number, "equipment deployed");
        Ok(OperationOutput::Deployed {
            id,
            sequence_number,
        })
    }

    async fn compensate(&mut self, _ctx: &OperationContext) -> Result<(), OperationError> {
        self.lifecycle.begin_compensate()?;
        let outcome = match self.deployed {
            Some((id, _)) => self.repository.delete(id).await.map_err(OperationError::from),
            None => Err(OperationError::Failed(
                "no deployed record to delete".to_string(),
            )),
        };
        self.lifecycle.finish_compensate(outcome)
    }

    fn completion_event(&self) -> Option<EquipmentEvent> {
        let (id, sequence_number) = self.deployed?;
        Some(EquipmentEvent::created(
            id,
            self.record.name.clone(),
            self.record.serial_number.clone(),
            Some(sequence_number),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equipment::{InMemoryEquipmentRepository, InMemorySequenceGenerator, RepositoryError};

    fn deploy(
        repo: &InMemoryEquipmentRepository,
        sequence: &InMemorySequenceGenerator,
    ) -> DeployEquipment {
        DeployEquipment::new(
            Arc::new(repo.clone()),
            Arc::new(sequence.clone()),
            NewEquipment::new("Generator", "G-9"),
        )
    }

    #[tokio::test]
    async fn test_execute_assigns_sequence_then_inserts() {
        let repo = InMemoryEquipmentRepository::starting_at(20);
        let sequence = InMemorySequenceGenerator::starting_at(1000);
        let mut op = deploy(&repo, &sequence);

        let output = op.execute(&OperationContext::new("tester")).await.unwrap();

        assert_eq!(
            output,
            OperationOutput::Deployed {
                id: EquipmentId::new(20),
                sequence_number: 1000,
            }
        );
        assert_eq!(
            repo.record(EquipmentId::new(20)).unwrap().sequence_number,
            Some(1000)
        );
    }

    #[tokio::test]
    async fn test_compensate_deletes_but_keeps_sequence_consumed() {
        let repo = InMemoryEquipmentRepository::new();
        let sequence = InMemorySequenceGenerator::starting_at(1000);
        let mut op = deploy(&repo, &sequence);
        let ctx = OperationContext::new("tester");
        op.execute(&ctx).await.unwrap();

        op.compensate(&ctx).await.unwrap();

        assert_eq!(repo.record_count(), 0);
        assert_eq!(sequence.peek(), 1001);
        assert_eq!(op.state(), OperationState::Compensated);
    }

    #[tokio::test]
    async fn test_sequence_failure_inserts_nothing() {
        let repo = InMemoryEquipmentRepository::new();
        let sequence = InMemorySequenceGenerator::new();
        sequence.set_fail(true);
        let mut op = deploy(&repo, &sequence);

        let result = op.execute(&OperationContext::new("tester")).await;

        assert!(matches!(
            result,
            Err(OperationError::Repository(RepositoryError::Unavailable(_)))
        ));
        assert_eq!(repo.record_count(), 0);
        assert_eq!(op.state(), OperationState::Failed);
    }

    #[tokio::test]
    async fn test_insert_failure_still_consumes_sequence() {
        let repo = InMemoryEquipmentRepository::new();
        repo.set_fail_on_insert(true);
        let sequence = InMemorySequenceGenerator::starting_at(5);
        let mut op = deploy(&repo, &sequence);

        assert!(op.execute(&OperationContext::new("tester")).await.is_err());
        assert_eq!(sequence.peek(), 6);
        assert_eq!(op.sequence_number(), None);
    }

    #[tokio::test]
    async fn test_completion_event_carries_sequence_number() {
        let repo = InMemoryEquipmentRepository::starting_at(1);
        let sequence = InMemorySequenceGenerator::starting_at(42);
        let mut op = deploy(&repo, &sequence);
        op.execute(&OperationContext::new("tester")).await.unwrap();

        assert_eq!(
            op.completion_event(),
            Some(EquipmentEvent::created(
                EquipmentId::new(1),
                "Generator",
                "G-9",
                Some(42)
            ))
        );
    }
}
