//! Concrete equipment operations.

mod add;
mod deploy;
mod update;

use std::sync::Arc;

use async_trait::async_trait;
use common::EquipmentId;
use equipment::{EquipmentPatch, EquipmentRepository, NewEquipment, SequenceGenerator};
use events::EquipmentEvent;

pub use add::AddEquipment;
pub use deploy::DeployEquipment;
pub use update::UpdateEquipment;

use crate::error::OperationError;
use crate::operation::{CompensatableOperation, OperationContext, OperationOutput};
use crate::state::OperationState;

/// Identifies the record an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRef {
    /// A record that already exists.
    Id(EquipmentId),
    /// The record produced by an earlier step of the same saga.
    Step(usize),
}

impl RecordRef {
    /// Resolves to a concrete ID using the outputs recorded so far.
    pub fn resolve(&self, ctx: &OperationContext) -> Result<EquipmentId, OperationError> {
        match *self {
            RecordRef::Id(id) => Ok(id),
            RecordRef::Step(step) => ctx
                .output(step)
                .and_then(OperationOutput::equipment_id)
                .ok_or(OperationError::UnresolvedReference { step }),
        }
    }
}

impl From<EquipmentId> for RecordRef {
    fn from(id: EquipmentId) -> Self {
        RecordRef::Id(id)
    }
}

/// The closed set of equipment operations a saga can be built from.
#[derive(Debug)]
pub enum EquipmentOperation {
    Add(AddEquipment),
    Update(UpdateEquipment),
    Deploy(DeployEquipment),
}

impl EquipmentOperation {
    pub fn add(repository: Arc<dyn EquipmentRepository>, record: NewEquipment) -> Self {
        EquipmentOperation::Add(AddEquipment::new(repository, record))
    }

    pub fn update(
        repository: Arc<dyn EquipmentRepository>,
        target: impl Into<RecordRef>,
        patch: EquipmentPatch,
    ) -> Self {
        EquipmentOperation::Update(UpdateEquipment::new(repository, target, patch))
    }

    pub fn deploy(
        repository: Arc<dyn EquipmentRepository>,
        sequence: Arc<dyn SequenceGenerator>,
        record: NewEquipment,
    ) -> Self {
        EquipmentOperation::Deploy(DeployEquipment::new(repository, sequence, record))
    }
}

#[async_trait]
impl CompensatableOperation for EquipmentOperation {
    fn name(&self) -> &str {
        match self {
            EquipmentOperation::Add(op) => op.name(),
            EquipmentOperation::Update(op) => op.name(),
            EquipmentOperation::Deploy(op) => op.name(),
        }
    }

    fn state(&self) -> OperationState {
        match self {
            EquipmentOperation::Add(op) => op.state(),
            EquipmentOperation::Update(op) => op.state(),
            EquipmentOperation::Deploy(op) => op.state(),
        }
    }

    async fn execute(&mut self, ctx: &OperationContext) -> Result<OperationOutput, OperationError> {
        match self {
            EquipmentOperation::Add(op) => op.execute(ctx).await,
            EquipmentOperation::Update(op) => op.execute(ctx).await,
            EquipmentOperation::Deploy(op) => op.execute(ctx).await,
        }
    }

    async fn compensate(&mut self, ctx: &OperationContext) -> Result<(), OperationError> {
        match self {
            EquipmentOperation::Add(op) => op.compensate(ctx).await,
            EquipmentOperation::Update(op) => op.compensate(ctx).await,
            EquipmentOperation::Deploy(op) => op.compensate(ctx).await,
        }
    }

    fn completion_event(&self) -> Option<EquipmentEvent> {
        match self {
            EquipmentOperation::Add(op) => op.completion_event(),
            EquipmentOperation::Update(op) => op.completion_event(),
            EquipmentOperation::Deploy(op) => op.completion_event(),
        }
    }
}

impl From<AddEquipment> for EquipmentOperation {
    fn from(op: AddEquipment) -> Self {
        EquipmentOperation::Add(op)
    }
}

impl From<UpdateEquipment> for EquipmentOperation {
    fn from(op: UpdateEquipment) -> Self {
        EquipmentOperation::Update(op)
    }
}

impl From<DeployEquipment> for EquipmentOperation {
    fn from(op: DeployEquipment) -> Self {
        EquipmentOperation::Deploy(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equipment::InMemoryEquipmentRepository;

    #[test]
    fn test_record_ref_resolves_earlier_output() {
        let mut ctx = OperationContext::new("tester");
        ctx.record_output(OperationOutput::Inserted(EquipmentId::new(500)));
        ctx.record_output(OperationOutput::None);

        assert_eq!(
            RecordRef::Id(EquipmentId::new(7)).resolve(&ctx),
            Ok(EquipmentId::new(7))
        );
        assert_eq!(RecordRef::Step(0).resolve(&ctx), Ok(EquipmentId::new(500)));
        assert_eq!(
            RecordRef::Step(1).resolve(&ctx),
            Err(OperationError::UnresolvedReference { step: 1 })
        );
        assert_eq!(
            RecordRef::Step(4).resolve(&ctx),
            Err(OperationError::UnresolvedReference { step: 4 })
        );
    }

    #[tokio::test]
    async fn test_enum_delegates_to_variant() {
        let repo = InMemoryEquipmentRepository::starting_at(10);
        let mut op = EquipmentOperation::add(Arc::new(repo.clone()), NewEquipment::new("Lathe", "L-1"));
        let ctx = OperationContext::new("tester");

        assert_eq!(op.name(), "AddEquipment");
        assert_eq!(op.state(), OperationState::Pending);

        let output = op.execute(&ctx).await.unwrap();

        assert_eq!(output, OperationOutput::Inserted(EquipmentId::new(10)));
        assert_eq!(op.state(), OperationState::Completed);
        assert_eq!(repo.record_count(), 1);
    }
}
