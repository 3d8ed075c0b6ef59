//! Collaborator traits supplied by the persistence layer.

use std::sync::Arc;

use async_trait::async_trait;
use common::EquipmentId;

use crate::error::Result;
use crate::record::{Equipment, NewEquipment};

/// Storage operations the saga steps rely on.
#[async_trait]
pub trait EquipmentRepository: Send + Sync {
    /// Stores a new record and returns the ID the store assigned.
    async fn insert(&self, record: NewEquipment) -> Result<EquipmentId>;

    /// Removes a record.
    async fn delete(&self, id: EquipmentId) -> Result<()>;

    /// Loads a record, or `None` if it does not exist.
    async fn get_by_id(&self, id: EquipmentId) -> Result<Option<Equipment>>;

    /// Overwrites an existing record with `record`.
    async fn update(&self, record: Equipment) -> Result<()>;
}

/// Source of deployment sequence numbers.
///
/// Numbers are never handed out twice and never reclaimed.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    async fn next_sequence(&self) -> Result<i64>;
}

#[async_trait]
impl<T: EquipmentRepository + ?Sized> EquipmentRepository for Arc<T> {
    async fn insert(&self, record: NewEquipment) -> Result<EquipmentId> {
        (**self).insert(record).await
    }

    async fn delete(&self, id: EquipmentId) -> Result<()> {
        (**self).delete(id).await
    }

    async fn get_by_id(&self, id: EquipmentId) -> Result<Option<Equipment>> {
        (**self).get_by_id(id).await
    }

    async fn update(&self, record: Equipment) -> Result<()> {
        (**self).update(record).await
    }
}
