//! Equipment records and the persistence boundary.
//!
//! The coordination core never talks to a database directly. Each saga step
//! goes through the narrow [`EquipmentRepository`] and [`SequenceGenerator`]
//! traits defined here. In-memory implementations back the tests, and
//! [`ResilientRepository`] wraps any implementation with a circuit breaker
//! and retry policy.

pub mod error;
pub mod memory;
pub mod record;
pub mod repository;
pub mod resilient;

pub use error::{RepositoryError, Result};
pub use memory::{InMemoryEquipmentRepository, InMemorySequenceGenerator};
pub use record::{Equipment, EquipmentPatch, NewEquipment};
pub use repository::{EquipmentRepository, SequenceGenerator};
pub use resilient::ResilientRepository;
