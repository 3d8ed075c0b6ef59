//! The report a saga run produces.

use crate::error::OperationError;
use crate::operation::OperationOutput;
use crate::state::OperationState;

/// What happened to one forward step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub name: String,
    pub state: OperationState,
    pub error: Option<OperationError>,
}

/// What happened when one completed step was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationOutcome {
    pub index: usize,
    pub name: String,
    pub state: OperationState,
    pub error: Option<OperationError>,
}

impl CompensationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of [`CompensationCoordinator::run_sequence`](crate::CompensationCoordinator::run_sequence).
///
/// `steps` holds one entry per operation that was attempted, in order.
/// `compensations` holds one entry per rollback, in the order they ran, which
/// is the reverse of step order.
///
/// `failed_step` is the overall success flag: `None` means every step
/// completed, `Some(i)` names the step that failed and triggered rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SagaResult {
    pub steps: Vec<StepOutcome>,
    pub failed_step: Option<usize>,
    pub compensations: Vec<CompensationOutcome>,
    pub outputs: Vec<OperationOutput>,
}

impl SagaResult {
    /// True when `failed_step` is `None`.
    pub fn is_success(&self) -> bool {
        self.failed_step.is_none()
    }

    /// The error the failing step reported.
    pub fn failure(&self) -> Option<&OperationError> {
        let index = self.failed_step?;
        self.steps.get(index).and_then(|step| step.error.as_ref())
    }

    /// True when a step failed and every rollback succeeded.
    pub fn is_fully_compensated(&self) -> bool {
        !self.is_success() && self.compensations.iter().all(CompensationOutcome::succeeded)
    }

    /// Rollbacks that failed; these need manual intervention.
    pub fn failed_compensations(&self) -> impl Iterator<Item = &CompensationOutcome> {
        self.compensations.iter().filter(|c| !c.succeeded())
    }

    /// Indices of the steps that were rolled back, in rollback order.
    pub fn compensated_indices(&self) -> Vec<usize> {
        self.compensations.iter().map(|c| c.index).collect()
    }
}
