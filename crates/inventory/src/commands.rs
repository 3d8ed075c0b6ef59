//! Equipment commands: validate, change state, and announce the change.

use std::sync::Arc;

use common::{ActorId, CorrelationId, EquipmentId};
use equipment::{
    EquipmentPatch, EquipmentRepository, NewEquipment, RepositoryError, SequenceGenerator,
};
use events::{DomainEvent, EquipmentEvent, EventDispatcher, EventError, PublishReport};
use saga::{
    CancellationToken, CompensationCoordinator, EquipmentOperation, OperationContext,
    OperationError, OperationOutput, SagaResult,
};

use crate::error::{CommandError, Result};

/// Entry point for every change to the equipment inventory.
///
/// Single-record changes go straight to the repository and publish one event
/// afterwards. Changes that span several writes run as a saga, so a failure
/// part-way through undoes the writes that already happened and publishes
/// nothing.
///
/// A cancellation token set with [`with_cancellation`](Self::with_cancellation)
/// stops single-record commands before they write and stops sagas before
/// their next step, rolling back the steps already done.
#[derive(Clone)]
pub struct EquipmentCommands {
    repository: Arc<dyn EquipmentRepository>,
    sequence: Arc<dyn SequenceGenerator>,
    dispatcher: EventDispatcher,
    cancellation: Option<CancellationToken>,
}

impl EquipmentCommands {
    pub fn new(
        repository: Arc<dyn EquipmentRepository>,
        sequence: Arc<dyn SequenceGenerator>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            repository,
            sequence,
            dispatcher,
            cancellation: None,
        }
    }

    /// Returns commands that observe `cancellation`.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Adds a record and publishes `EquipmentCreated`.
    #[tracing::instrument(skip_all, fields(actor = %actor, serial_number = %record.serial_number))]
    pub async fn add(&self, actor: &ActorId, record: NewEquipment) -> Result<EquipmentId> {
        ensure_actor(actor)?;
        let correlation_id = CorrelationId::new();
        if let Err(errors) = record.validate() {
            return self.reject(actor, correlation_id, None, errors).await;
        }

        let event_fields = (
            record.name.clone(),
            record.serial_number.clone(),
            record.sequence_number,
        );
        self.ensure_not_cancelled()?;
        let id = self.repository.insert(record).await?;
        let (name, serial_number, sequence_number) = event_fields;
        self.publish(
            actor,
            correlation_id,
            EquipmentEvent::created(id, name, serial_number, sequence_number),
        )
        .await?;

        tracing::info!(equipment_id = %id, "equipment added");
        Ok(id)
    }

    /// Applies `patch` to a record and publishes `EquipmentUpdated`.
    ///
    /// Returns the names of the fields that changed. A patch that changes
    /// nothing writes nothing and publishes nothing.
    #[tracing::instrument(skip_all, fields(actor = %actor, equipment_id = %id))]
    pub async fn update(
        &self,
        actor: &ActorId,
        id: EquipmentId,
        patch: EquipmentPatch,
    ) -> Result<Vec<String>> {
        ensure_actor(actor)?;
        let correlation_id = CorrelationId::new();
        let current = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound(id))?;

        let next = patch.apply(&current);
        if let Err(errors) = next.validate() {
            return self.reject(actor, correlation_id, Some(id), errors).await;
        }

        let changed_fields = next.changed_fields(&current);
        if changed_fields.is_empty() {
            tracing::debug!("update changed nothing");
            return Ok(changed_fields);
        }

        self.ensure_not_cancelled()?;
        self.repository.update(next).await?;
        self.publish(
            actor,
            correlation_id,
            EquipmentEvent::updated(id, changed_fields.clone()),
        )
        .await?;

        tracing::info!(changed = ?changed_fields, "equipment updated");
        Ok(changed_fields)
    }

    /// Removes a record and publishes `EquipmentDeleted`.
    #[tracing::instrument(skip_all, fields(actor = %actor, equipment_id = %id))]
    pub async fn delete(&self, actor: &ActorId, id: EquipmentId) -> Result<()> {
        ensure_actor(actor)?;
        self.ensure_not_cancelled()?;
        self.repository.delete(id).await?;
        self.publish(actor, CorrelationId::new(), EquipmentEvent::deleted(id))
            .await?;

        tracing::info!("equipment deleted");
        Ok(())
    }

    /// Assigns the next sequence number to a record and stores it.
    ///
    /// Returns the new record's ID and its sequence number.
    #[tracing::instrument(skip_all, fields(actor = %actor, serial_number = %record.serial_number))]
    pub async fn deploy(&self, actor: &ActorId, record: NewEquipment) -> Result<(EquipmentId, i64)> {
        ensure_actor(actor)?;
        let correlation_id = CorrelationId::new();
        if let Err(errors) = record.validate() {
            return self.reject(actor, correlation_id, None, errors).await;
        }

        let operation = EquipmentOperation::deploy(
            self.repository.clone(),
            self.sequence.clone(),
            record,
        );
        let result = self
            .run_saga("deploy", actor, correlation_id, vec![operation])
            .await?;

        match result.outputs.first() {
            Some(OperationOutput::Deployed {
                id,
                sequence_number,
            }) => Ok((*id, *sequence_number)),
            _ => Err(CommandError::SagaFailed {
                step: 0,
                operation: "DeployEquipment".to_string(),
                error: OperationError::Failed("deploy produced no record".to_string()),
                compensation_failures: 0,
            }),
        }
    }

    /// Adds every record or none of them.
    ///
    /// All records are validated first; any invalid record rejects the whole
    /// batch. If an insert fails, the records already inserted are deleted
    /// again. On success one `EquipmentCreated` per record and a closing
    /// `BulkOperationCompleted` are published.
    #[tracing::instrument(skip_all, fields(actor = %actor, records = records.len()))]
    pub async fn bulk_add(
        &self,
        actor: &ActorId,
        records: Vec<NewEquipment>,
    ) -> Result<Vec<EquipmentId>> {
        ensure_actor(actor)?;
        let correlation_id = CorrelationId::new();
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let errors: Vec<String> = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| record.validate().err().map(|e| (index, e)))
            .flat_map(|(index, errors)| {
                errors
                    .into_iter()
                    .map(move |error| format!("record {index}: {error}"))
            })
            .collect();
        if !errors.is_empty() {
            return self.reject(actor, correlation_id, None, errors).await;
        }

        let operations = records
            .into_iter()
            .map(|record| EquipmentOperation::add(self.repository.clone(), record))
            .collect();
        let result = self
            .run_saga("bulk_add", actor, correlation_id, operations)
            .await?;

        let ids: Vec<EquipmentId> = result
            .outputs
            .iter()
            .filter_map(OperationOutput::equipment_id)
            .collect();
        self.publish(
            actor,
            correlation_id,
            EquipmentEvent::bulk_operation_completed("bulk_add", ids.clone(), 0),
        )
        .await?;

        tracing::info!(added = ids.len(), "bulk add completed");
        Ok(ids)
    }

    async fn run_saga(
        &self,
        name: &str,
        actor: &ActorId,
        correlation_id: CorrelationId,
        operations: Vec<EquipmentOperation>,
    ) -> Result<SagaResult> {
        let mut context =
            OperationContext::new(actor.clone()).with_correlation_id(correlation_id);
        if let Some(cancellation) = &self.cancellation {
            context = context.with_cancellation(cancellation.clone());
        }
        let result = CompensationCoordinator::new(context)
            .named(name)
            .with_dispatcher(self.dispatcher.clone())
            .run_sequence(operations)
            .await?;

        let Some(step) = result.failed_step else {
            return Ok(result);
        };
        let operation = result
            .steps
            .get(step)
            .map(|outcome| outcome.name.clone())
            .unwrap_or_default();
        let error = result
            .failure()
            .cloned()
            .unwrap_or_else(|| OperationError::Failed("step failed".to_string()));
        Err(CommandError::SagaFailed {
            step,
            operation,
            error,
            compensation_failures: result.failed_compensations().count(),
        })
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        match &self.cancellation {
            Some(cancellation) if cancellation.is_cancelled() => Err(CommandError::Cancelled),
            _ => Ok(()),
        }
    }

    async fn reject<T>(
        &self,
        actor: &ActorId,
        correlation_id: CorrelationId,
        equipment_id: Option<EquipmentId>,
        errors: Vec<String>,
    ) -> Result<T> {
        tracing::warn!(errors = ?errors, "equipment rejected");
        self.publish(
            actor,
            correlation_id,
            EquipmentEvent::validation_failed(equipment_id, errors.clone()),
        )
        .await?;
        Err(CommandError::Validation(errors))
    }

    async fn publish(
        &self,
        actor: &ActorId,
        correlation_id: CorrelationId,
        payload: EquipmentEvent,
    ) -> Result<PublishReport> {
        let event = DomainEvent::builder(payload)
            .triggered_by(actor.clone())
            .correlation_id(correlation_id)
            .build()?;
        Ok(self.dispatcher.publish(event).await)
    }
}

fn ensure_actor(actor: &ActorId) -> Result<()> {
    if actor.is_blank() {
        return Err(EventError::MissingActor.into());
    }
    Ok(())
}
