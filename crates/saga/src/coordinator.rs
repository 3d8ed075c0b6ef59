//! Saga coordinator: runs operations in order and rolls back on failure.

use std::time::Instant;

use events::{DomainEvent, EventDispatcher};

use crate::error::{OperationError, Result, SagaError};
use crate::operation::{CompensatableOperation, OperationContext};
use crate::result::{CompensationOutcome, SagaResult, StepOutcome};
use crate::state::OperationState;

/// Runs a sequence of compensatable operations as one unit.
///
/// Steps run strictly one after another. If a step fails, or the
/// cancellation token fires before a step starts, no further steps run and
/// every step that completed is compensated in reverse order. A rollback
/// failure is recorded and the remaining rollbacks still run.
///
/// A coordinator runs a single saga; [`run_sequence`](Self::run_sequence)
/// consumes it.
#[derive(Debug)]
pub struct CompensationCoordinator {
    name: String,
    context: OperationContext,
    dispatcher: Option<EventDispatcher>,
}

impl CompensationCoordinator {
    pub fn new(context: OperationContext) -> Self {
        Self {
            name: "saga".to_string(),
            context,
            dispatcher: None,
        }
    }

    /// Names the saga in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Publishes the completion events of every step once the saga succeeds.
    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Executes `operations` in order.
    ///
    /// Step failures and rollback failures are reported in the returned
    /// [`SagaResult`]. An `Err` means an operation broke its contract (it was
    /// not `Pending` when handed over, or claimed success without reaching
    /// `Completed`); any completed steps have already been rolled back when it
    /// is returned.
    ///
    /// Completion events are not published as each step finishes. They are
    /// held back and published as one batch after the last step succeeds, so
    /// a saga that rolls back publishes nothing.
    #[tracing::instrument(skip_all, fields(saga = %self.name, steps = operations.len()))]
    pub async fn run_sequence<O>(self, mut operations: Vec<O>) -> Result<SagaResult>
    where
        O: CompensatableOperation,
    {
        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();

        if self.dispatcher.is_some() && self.context.actor().is_blank() {
            return Err(SagaError::MissingActor);
        }
        for (index, operation) in operations.iter().enumerate() {
            if !operation.state().can_execute() {
                return Err(SagaError::ContractViolation {
                    step: index,
                    name: operation.name().to_string(),
                    reason: format!("expected Pending, found {}", operation.state()),
                });
            }
        }

        let Self {
            name,
            mut context,
            dispatcher,
        } = self;
        let mut steps = Vec::with_capacity(operations.len());
        let mut failed_step = None;
        let mut violation = None;

        for (index, operation) in operations.iter_mut().enumerate() {
            if context.is_cancelled() {
                tracing::warn!(step = index, operation = operation.name(), "saga cancelled");
                steps.push(StepOutcome {
                    index,
                    name: operation.name().to_string(),
                    state: operation.state(),
                    error: Some(OperationError::Cancelled),
                });
                failed_step = Some(index);
                break;
            }

            tracing::info!(step = index, operation = operation.name(), "saga step started");
            match operation.execute(&context).await {
                Ok(output) if operation.state() == OperationState::Completed => {
                    context.record_output(output);
                    steps.push(StepOutcome {
                        index,
                        name: operation.name().to_string(),
                        state: OperationState::Completed,
                        error: None,
                    });
                }
                Ok(_) => {
                    let state = operation.state();
                    tracing::error!(
                        step = index,
                        operation = operation.name(),
                        %state,
                        "operation reported success without completing"
                    );
                    violation = Some(SagaError::ContractViolation {
                        step: index,
                        name: operation.name().to_string(),
                        reason: format!("execute succeeded but state is {state}"),
                    });
                    steps.push(StepOutcome {
                        index,
                        name: operation.name().to_string(),
                        state,
                        error: None,
                    });
                    failed_step = Some(index);
                    break;
                }
                Err(error) => {
                    tracing::warn!(
                        step = index,
                        operation = operation.name(),
                        error = %error,
                        "saga step failed"
                    );
                    steps.push(StepOutcome {
                        index,
                        name: operation.name().to_string(),
                        state: operation.state(),
                        error: Some(error),
                    });
                    failed_step = Some(index);
                    break;
                }
            }
        }

        let compensations = match failed_step {
            Some(failed) => rollback(&context, &mut operations[..failed], &mut steps).await,
            None => Vec::new(),
        };

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);

        if let Some(violation) = violation {
            metrics::counter!("saga_failed").increment(1);
            return Err(violation);
        }

        match failed_step {
            Some(failed) => {
                metrics::counter!("saga_failed").increment(1);
                tracing::warn!(
                    saga = %name,
                    failed_step = failed,
                    compensated = compensations.len(),
                    duration,
                    "saga rolled back"
                );
            }
            None => {
                if let Some(dispatcher) = &dispatcher {
                    publish_completion_events(dispatcher, &context, &operations).await?;
                }
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(saga = %name, duration, "saga completed successfully");
            }
        }

        Ok(SagaResult {
            steps,
            failed_step,
            compensations,
            outputs: context.into_outputs(),
        })
    }
}

/// Compensates `completed` in reverse order.
///
/// Every step is attempted regardless of earlier rollback failures.
/// Cancellation is not consulted here.
async fn rollback<O>(
    context: &OperationContext,
    completed: &mut [O],
    steps: &mut [StepOutcome],
) -> Vec<CompensationOutcome>
where
    O: CompensatableOperation,
{
    let mut outcomes = Vec::with_capacity(completed.len());

    for (index, operation) in completed.iter_mut().enumerate().rev() {
        let result = operation.compensate(context).await;
        let state = operation.state();
        if let Some(step) = steps.get_mut(index) {
            step.state = state;
        }

        let error = match result {
            Ok(()) => {
                metrics::counter!("saga_compensations_total", "outcome" => "compensated")
                    .increment(1);
                tracing::info!(step = index, operation = operation.name(), "step compensated");
                None
            }
            Err(error) => {
                metrics::counter!("saga_compensations_total", "outcome" => "failed")
                    .increment(1);
                tracing::error!(
                    step = index,
                    operation = operation.name(),
                    error = %error,
                    "compensation failed; manual intervention required"
                );
                Some(error)
            }
        };

        outcomes.push(CompensationOutcome {
            index,
            name: operation.name().to_string(),
            state,
            error,
        });
    }

    outcomes
}

async fn publish_completion_events<O>(
    dispatcher: &EventDispatcher,
    context: &OperationContext,
    operations: &[O],
) -> Result<()>
where
    O: CompensatableOperation,
{
    let events = operations
        .iter()
        .filter_map(CompensatableOperation::completion_event)
        .map(|payload| {
            DomainEvent::builder(payload)
                .triggered_by(context.actor().clone())
                .maybe_correlation_id(context.correlation_id())
                .build()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if events.is_empty() {
        return Ok(());
    }

    let reports = dispatcher.publish_batch(events).await;
    let failures: usize = reports.iter().map(|report| report.failures.len()).sum();
    if failures > 0 {
        tracing::warn!(
            events = reports.len(),
            failures,
            "completion events published with handler failures"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationOutput;
    use async_trait::async_trait;
    use common::EquipmentId;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Scripted operation that records every call into a shared log.
    struct Scripted {
        name: String,
        state: OperationState,
        fail_execute: bool,
        fail_compensate: bool,
        log: Log,
    }

    impl Scripted {
        fn new(name: &str, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                state: OperationState::Pending,
                fail_execute: false,
                fail_compensate: false,
                log: log.clone(),
            }
        }

        fn failing(mut self) -> Self {
            self.fail_execute = true;
            self
        }

        fn failing_compensation(mut self) -> Self {
            self.fail_compensate = true;
            self
        }
    }

    #[async_trait]
    impl CompensatableOperation for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn state(&self) -> OperationState {
            self.state
        }

        async fn execute(
            &mut self,
            _ctx: &OperationContext,
        ) -> std::result::Result<OperationOutput, OperationError> {
            self.log.lock().unwrap().push(format!("execute {}", self.name));
            if self.fail_execute {
                self.state = OperationState::Failed;
                return Err(OperationError::Failed(format!("{} failed", self.name)));
            }
            self.state = OperationState::Completed;
            Ok(OperationOutput::Inserted(EquipmentId::new(1)))
        }

        async fn compensate(
            &mut self,
            _ctx: &OperationContext,
        ) -> std::result::Result<(), OperationError> {
            self.log.lock().unwrap().push(format!("compensate {}", self.name));
            if self.fail_compensate {
                self.state = OperationState::CompensationFailed;
                return Err(OperationError::Failed("undo failed".into()));
            }
            self.state = OperationState::Compensated;
            Ok(())
        }
    }

    fn log_of(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let log = Log::default();
        let ops = vec![Scripted::new("a", &log), Scripted::new("b", &log)];

        let result = CompensationCoordinator::new(OperationContext::new("tester"))
            .run_sequence(ops)
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.compensations.is_empty());
        assert_eq!(result.outputs.len(), 2);
        assert_eq!(log_of(&log), vec!["execute a", "execute b"]);
    }

    #[tokio::test]
    async fn test_rollback_runs_in_reverse_order() {
        let log = Log::default();
        let ops = vec![
            Scripted::new("a", &log),
            Scripted::new("b", &log),
            Scripted::new("c", &log).failing(),
            Scripted::new("d", &log),
        ];

        let result = CompensationCoordinator::new(OperationContext::new("tester"))
            .run_sequence(ops)
            .await
            .unwrap();

        assert_eq!(result.failed_step, Some(2));
        assert_eq!(result.compensated_indices(), vec![1, 0]);
        assert_eq!(
            log_of(&log),
            vec!["execute a", "execute b", "execute c", "compensate b", "compensate a"]
        );
        assert_eq!(result.steps[0].state, OperationState::Compensated);
        assert_eq!(result.steps[2].state, OperationState::Failed);
        assert_eq!(result.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_first_step_failure_compensates_nothing() {
        let log = Log::default();
        let ops = vec![Scripted::new("a", &log).failing(), Scripted::new("b", &log)];

        let result = CompensationCoordinator::new(OperationContext::new("tester"))
            .run_sequence(ops)
            .await
            .unwrap();

        assert_eq!(result.failed_step, Some(0));
        assert!(result.compensations.is_empty());
        assert_eq!(log_of(&log), vec!["execute a"]);
    }

    #[tokio::test]
    async fn test_compensation_failure_does_not_stop_rollback() {
        let log = Log::default();
        let ops = vec![
            Scripted::new("a", &log),
            Scripted::new("b", &log).failing_compensation(),
            Scripted::new("c", &log).failing(),
        ];

        let result = CompensationCoordinator::new(OperationContext::new("tester"))
            .run_sequence(ops)
            .await
            .unwrap();

        assert_eq!(result.compensated_indices(), vec![1, 0]);
        assert!(!result.is_fully_compensated());
        let failed: Vec<_> = result.failed_compensations().map(|c| c.index).collect();
        assert_eq!(failed, vec![1]);
        assert_eq!(result.steps[1].state, OperationState::CompensationFailed);
        assert_eq!(result.steps[0].state, OperationState::Compensated);
    }

    #[tokio::test]
    async fn test_empty_sequence_succeeds() {
        let result = CompensationCoordinator::new(OperationContext::new("tester"))
            .run_sequence(Vec::<Scripted>::new())
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.steps.is_empty());
    }

    #[tokio::test]
    async fn test_non_pending_operation_is_rejected_before_running() {
        let log = Log::default();
        let mut stale = Scripted::new("b", &log);
        stale.state = OperationState::Completed;
        let ops = vec![Scripted::new("a", &log), stale];

        let result = CompensationCoordinator::new(OperationContext::new("tester"))
            .run_sequence(ops)
            .await;

        assert!(matches!(
            result,
            Err(SagaError::ContractViolation { step: 1, .. })
        ));
        assert!(log_of(&log).is_empty());
    }

    #[tokio::test]
    async fn test_blank_actor_with_dispatcher_is_rejected() {
        let log = Log::default();

        let result = CompensationCoordinator::new(OperationContext::new("  "))
            .with_dispatcher(EventDispatcher::new())
            .run_sequence(vec![Scripted::new("a", &log)])
            .await;

        assert!(matches!(result, Err(SagaError::MissingActor)));
        assert!(log_of(&log).is_empty());
    }
}
