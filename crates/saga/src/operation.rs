//! The compensatable-operation contract.

use async_trait::async_trait;
use common::{ActorId, CorrelationId, EquipmentId};
use events::EquipmentEvent;
use tokio_util::sync::CancellationToken;

use crate::error::OperationError;
use crate::state::OperationState;

/// Value produced by a successful forward action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    /// The step produced nothing later steps can refer to.
    None,
    /// A record was inserted under this ID.
    Inserted(EquipmentId),
    /// A record was overwritten.
    Updated {
        id: EquipmentId,
        changed_fields: Vec<String>,
    },
    /// A record was inserted with a freshly assigned sequence number.
    Deployed {
        id: EquipmentId,
        sequence_number: i64,
    },
}

impl OperationOutput {
    /// Returns the record the step acted on, if any.
    pub fn equipment_id(&self) -> Option<EquipmentId> {
        match self {
            OperationOutput::None => None,
            OperationOutput::Inserted(id) => Some(*id),
            OperationOutput::Updated { id, .. } => Some(*id),
            OperationOutput::Deployed { id, .. } => Some(*id),
        }
    }
}

/// Per-saga information handed to every step.
///
/// Holds who triggered the saga, the cancellation signal, and the outputs of
/// the steps that have completed so far (indexed by step position), so a step
/// can act on an ID an earlier step produced.
#[derive(Debug, Clone)]
pub struct OperationContext {
    actor: ActorId,
    correlation_id: Option<CorrelationId>,
    cancellation: CancellationToken,
    outputs: Vec<OperationOutput>,
}

impl OperationContext {
    pub fn new(actor: impl Into<ActorId>) -> Self {
        Self {
            actor: actor.into(),
            correlation_id: None,
            cancellation: CancellationToken::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns the output of the step at `index`, if it has completed.
    pub fn output(&self, index: usize) -> Option<&OperationOutput> {
        self.outputs.get(index)
    }

    /// Returns the outputs of all completed steps, in step order.
    pub fn outputs(&self) -> &[OperationOutput] {
        &self.outputs
    }

    pub(crate) fn record_output(&mut self, output: OperationOutput) {
        self.outputs.push(output);
    }

    pub(crate) fn into_outputs(self) -> Vec<OperationOutput> {
        self.outputs
    }
}

/// A unit of forward work paired with the action that undoes it.
///
/// `execute` performs the side effect and captures whatever is needed to
/// reverse it. `compensate` reverses it and is only valid once the operation
/// has reached [`OperationState::Completed`]; from any other state it returns
/// [`OperationError::InvalidState`] without touching anything.
#[async_trait]
pub trait CompensatableOperation: Send {
    /// Returns the name of this operation, used in logs and results.
    fn name(&self) -> &str;

    /// Returns the current lifecycle state.
    fn state(&self) -> OperationState;

    /// Performs the forward action.
    async fn execute(&mut self, ctx: &OperationContext) -> Result<OperationOutput, OperationError>;

    /// Reverses a completed forward action.
    async fn compensate(&mut self, ctx: &OperationContext) -> Result<(), OperationError>;

    /// Event describing the completed forward action, published once the
    /// whole saga has succeeded.
    fn completion_event(&self) -> Option<EquipmentEvent> {
        None
    }
}

#[async_trait]
impl<T: CompensatableOperation + ?Sized> CompensatableOperation for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn state(&self) -> OperationState {
        (**self).state()
    }

    async fn execute(&mut self, ctx: &OperationContext) -> Result<OperationOutput, OperationError> {
        (**self).execute(ctx).await
    }

    async fn compensate(&mut self, ctx: &OperationContext) -> Result<(), OperationError> {
        (**self).compensate(ctx).await
    }

    fn completion_event(&self) -> Option<EquipmentEvent> {
        (**self).completion_event()
    }
}

/// Guarded state transitions shared by every concrete operation.
#[derive(Debug, Clone, Default)]
pub struct OperationLifecycle {
    state: OperationState,
}

impl OperationLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Pending → Executing.
    pub fn begin_execute(&mut self) -> Result<(), OperationError> {
        self.transition(OperationState::Pending, OperationState::Executing)
    }

    /// Executing → Completed.
    pub fn complete(&mut self) -> Result<(), OperationError> {
        self.transition(OperationState::Executing, OperationState::Completed)
    }

    /// Executing → Failed.
    pub fn fail(&mut self) -> Result<(), OperationError> {
        self.transition(OperationState::Executing, OperationState::Failed)
    }

    /// Completed → Compensating.
    pub fn begin_compensate(&mut self) -> Result<(), OperationError> {
        self.transition(OperationState::Completed, OperationState::Compensating)
    }

    /// Compensating → Compensated.
    pub fn compensated(&mut self) -> Result<(), OperationError> {
        self.transition(OperationState::Compensating, OperationState::Compensated)
    }

    /// Compensating → CompensationFailed.
    pub fn compensation_failed(&mut self) -> Result<(), OperationError> {
        self.transition(
            OperationState::Compensating,
            OperationState::CompensationFailed,
        )
    }

    /// Records the outcome of a forward action and passes it through.
    pub fn finish_execute<T>(
        &mut self,
        outcome: Result<T, OperationError>,
    ) -> Result<T, OperationError> {
        match outcome {
            Ok(value) => {
                self.complete()?;
                Ok(value)
            }
            Err(error) => {
                self.fail()?;
                Err(error)
            }
        }
    }

    /// Records the outcome of an undo action and passes it through.
    pub fn finish_compensate(
        &mut self,
        outcome: Result<(), OperationError>,
    ) -> Result<(), OperationError> {
        match outcome {
            Ok(()) => self.compensated(),
            Err(error) => {
                self.compensation_failed()?;
                Err(error)
            }
        }
    }

    fn transition(
        &mut self,
        expected: OperationState,
        next: OperationState,
    ) -> Result<(), OperationError> {
        if self.state != expected {
            return Err(OperationError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        self.state = next;
        Ok(())
    }
}
