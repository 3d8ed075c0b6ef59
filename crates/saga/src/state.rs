//! Operation state machine.

use serde::{Deserialize, Serialize};

/// The state of a compensatable operation in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Executing ──┬──► Failed
///                         └──► Completed ──► Compensating ──┬──► Compensated
///                                                           └──► CompensationFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OperationState {
    /// Operation has not started yet.
    #[default]
    Pending,

    /// The forward action is running.
    Executing,

    /// The forward action succeeded and its undo state is captured.
    Completed,

    /// The forward action failed (terminal state).
    Failed,

    /// The undo action is running.
    Compensating,

    /// The forward action was reversed (terminal state).
    Compensated,

    /// The undo action failed; needs manual intervention (terminal state).
    CompensationFailed,
}

impl OperationState {
    /// Returns true if the forward action can start.
    pub fn can_execute(&self) -> bool {
        matches!(self, OperationState::Pending)
    }

    /// Returns true if the undo action can start.
    pub fn can_compensate(&self) -> bool {
        matches!(self, OperationState::Completed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Failed
                | OperationState::Compensated
                | OperationState::CompensationFailed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "Pending",
            OperationState::Executing => "Executing",
            OperationState::Completed => "Completed",
            OperationState::Failed => "Failed",
            OperationState::Compensating => "Compensating",
            OperationState::Compensated => "Compensated",
            OperationState::CompensationFailed => "CompensationFailed",
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
