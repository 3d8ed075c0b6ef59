//! Compensating-operation (saga) framework for multi-step equipment changes.
//!
//! A saga is an ordered list of [`CompensatableOperation`]s. The
//! [`CompensationCoordinator`] runs them one after another; when a step
//! fails, every step that already completed is compensated in reverse order
//! and the outcome of each rollback is reported in the [`SagaResult`].
//!
//! The concrete steps are:
//! 1. [`AddEquipment`]: insert a record, undone by deleting it
//! 2. [`UpdateEquipment`]: overwrite a record, undone by restoring its pre-image
//! 3. [`DeployEquipment`]: assign a sequence number and insert, undone by deleting
//!    (sequence numbers are not reclaimed)

pub mod coordinator;
pub mod error;
pub mod operation;
pub mod operations;
pub mod result;
pub mod state;

pub use coordinator::CompensationCoordinator;
pub use error::{OperationError, SagaError};
pub use operation::{CompensatableOperation, OperationContext, OperationLifecycle, OperationOutput};
pub use operations::{AddEquipment, DeployEquipment, EquipmentOperation, RecordRef, UpdateEquipment};
pub use result::{CompensationOutcome, SagaResult, StepOutcome};
pub use state::OperationState;
pub use tokio_util::sync::CancellationToken;
