//! Identifier newtypes shared across the equipment inventory crates.

pub mod types;

pub use types::{ActorId, CorrelationId, EquipmentId};
