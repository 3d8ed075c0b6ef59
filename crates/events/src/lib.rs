//! In-process domain events for the equipment inventory.
//!
//! This crate provides:
//! - [`DomainEvent`], the immutable envelope every published event travels in
//! - [`EventKind`], the stable tag handlers are registered under
//! - [`EventHandler`], the single-method capability subscribers implement
//! - [`EventDispatcher`], which fans an event out to every handler for its
//!   kind concurrently and isolates handler failures from each other and
//!   from the publisher

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod registry;

pub use dispatcher::{EventDispatcher, HandlerFailure, PublishReport};
pub use error::{EventError, HandlerError};
pub use event::{
    BulkOperationCompleted, DomainEvent, DomainEventBuilder, EquipmentCreated, EquipmentDeleted,
    EquipmentEvent, EquipmentUpdated, EventId, EventKind, SCHEMA_VERSION, ValidationFailed,
};
pub use handler::EventHandler;
pub use registry::HandlerRegistry;
