use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use equipment::{Equipment, EquipmentPatch, EquipmentRepository, RepositoryError};
use events::EquipmentEvent;

use crate::error::OperationError;
use crate::operation::{
    CompensatableOperation, OperationContext, OperationLifecycle, OperationOutput,
};
use crate::operations::RecordRef;
use crate::state::OperationState;

/// Applies new values to an existing record.
///
/// The record as it was before the change is kept, and compensation writes
/// it back.
pub struct UpdateEquipment {
    repository: Arc<dyn EquipmentRepository>,
    target: RecordRef,
    patch: EquipmentPatch,
    lifecycle: OperationLifecycle,
    pre_image: Option<Equipment>,
    changed_fields: Vec<String>,
}

impl UpdateEquipment {
    pub fn new(
        repository: Arc<dyn EquipmentRepository>,
        target: impl Into<RecordRef>,
        patch: EquipmentPatch,
    ) -> Self {
        Self {
            repository,
            target: target.into(),
            patch,
            lifecycle: OperationLifecycle::new(),
            pre_image: None,
            changed_fields: Vec::new(),
        }
    }

    /// The record as it was before this operation changed it.
    pub fn pre_image(&self) -> Option<&Equipment> {
        self.pre_image.as_ref()
    }

    async fn apply(&self, ctx: &OperationContext) -> Result<(Equipment, Equipment), OperationError> {
        let id = self.target.resolve(ctx)?;
        let current = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound(id))?;
        let next = self.patch.apply(&current);
        self.repository.update(next.clone()).await?;
        Ok((current, next))
    }
}

impl fmt::Debug for UpdateEquipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateEquipment")
            .field("target", &self.target)
            .field("patch", &self.patch)
            .field("state", &self.lifecycle.state())
            .field("pre_image", &self.pre_image)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompensatableOperation for UpdateEquipment {
    fn name(&self) -> &str {
        "UpdateEquipment"
    }

    fn state(&self) -> OperationState {
        self.lifecycle.state()
    }

    async fn execute(&mut self, ctx: &OperationContext) -> Result<OperationOutput, OperationError> {
        self.lifecycle.begin_execute()?;
        let outcome = self.apply(ctx).await;
        let (before, after) = self.lifecycle.finish_execute(outcome)?;

        let id = after.id;
        self.changed_fields = after.changed_fields(&before);
        self.pre_image = Some(before);
        tracing::debug!(equipment_id = %id, changed = ?self.changed_fields, "equipment updated");
        Ok(OperationOutput::Updated {
            id,
            changed_fields: self.changed_fields.clone(),
        })
    }

    async fn compensate(&mut self, _ctx: &OperationContext) -> Result<(), OperationError> {
        self.lifecycle.begin_compensate()?;
        let outcome = match &self.pre_image {
            Some(before) => self
                .repository
                .update(before.clone())
                .await
                .map_err(OperationError::from),
            None => Err(OperationError::Failed(
                "no pre-image captured to restore".to_string(),
            )),
        };
        self.lifecycle.finish_compensate(outcome)
    }

    fn completion_event(&self) -> Option<EquipmentEvent> {
        let before = self.pre_image.as_ref()?;
        Some(EquipmentEvent::updated(
            before.id,
            self.changed_fields.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::EquipmentId;
    use equipment::{InMemoryEquipmentRepository, NewEquipment};

    async fn seeded() -> (InMemoryEquipmentRepository, EquipmentId) {
        let repo = InMemoryEquipmentRepository::new();
        let id = repo
            .insert(NewEquipment::new("Forklift", "FL-1").with_location("Dock 1"))
            .await
            .unwrap();
        (repo, id)
    }

    #[tokio::test]
    async fn test_execute_applies_patch_and_keeps_pre_image() {
        let (repo, id) = seeded().await;
        let mut op = UpdateEquipment::new(
            Arc::new(repo.clone()),
            id,
            EquipmentPatch::new().location(Some("Dock 7".to_string())),
        );

        let output = op.execute(&OperationContext::new("tester")).await.unwrap();

        assert_eq!(
            output,
            OperationOutput::Updated {
                id,
                changed_fields: vec!["location".to_string()],
            }
        );
        assert_eq!(repo.record(id).unwrap().location.as_deref(), Some("Dock 7"));
        assert_eq!(op.pre_image().unwrap().location.as_deref(), Some("Dock 1"));
    }

    #[tokio::test]
    async fn test_compensate_restores_pre_image() {
        let (repo, id) = seeded().await;
        let original = repo.record(id).unwrap();
        let mut op = UpdateEquipment::new(
            Arc::new(repo.clone()),
            id,
            EquipmentPatch::new().name("Forklift XL").location(None),
        );
        let ctx = OperationContext::new("tester");
        op.execute(&ctx).await.unwrap();

        op.compensate(&ctx).await.unwrap();

        assert_eq!(repo.record(id), Some(original));
        assert_eq!(op.state(), OperationState::Compensated);
    }

    #[tokio::test]
    async fn test_missing_record_fails() {
        let repo = InMemoryEquipmentRepository::new();
        let mut op = UpdateEquipment::new(
            Arc::new(repo),
            EquipmentId::new(77),
            EquipmentPatch::new().name("Nope"),
        );

        let result = op.execute(&OperationContext::new("tester")).await;

        assert_eq!(
            result,
            Err(OperationError::Repository(RepositoryError::NotFound(
                EquipmentId::new(77)
            )))
        );
        assert_eq!(op.state(), OperationState::Failed);
    }

    #[tokio::test]
    async fn test_unresolved_step_reference_fails() {
        let repo = InMemoryEquipmentRepository::new();
        let mut op = UpdateEquipment::new(
            Arc::new(repo),
            RecordRef::Step(0),
            EquipmentPatch::new().name("Nope"),
        );

        let result = op.execute(&OperationContext::new("tester")).await;

        assert_eq!(result, Err(OperationError::UnresolvedReference { step: 0 }));
        assert_eq!(op.state(), OperationState::Failed);
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_record_untouched() {
        let (repo, id) = seeded().await;
        repo.set_fail_on_update(true);
        let mut op = UpdateEquipment::new(
            Arc::new(repo.clone()),
            id,
            EquipmentPatch::new().name("Changed"),
        );

        assert!(op.execute(&OperationContext::new("tester")).await.is_err());
        assert_eq!(repo.record(id).unwrap().name, "Forklift");
        assert!(op.pre_image().is_none());
    }
}
