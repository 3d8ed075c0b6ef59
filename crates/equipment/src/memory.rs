//! In-memory repository and sequence generator for tests and local runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::EquipmentId;

use crate::error::{RepositoryError, Result};
use crate::record::{Equipment, NewEquipment};
use crate::repository::{EquipmentRepository, SequenceGenerator};

#[derive(Debug)]
struct InMemoryRepositoryState {
    records: BTreeMap<EquipmentId, Equipment>,
    next_id: i64,
    fail_on_insert: bool,
    fail_on_update: bool,
    fail_on_delete: bool,
    /// Number of upcoming calls that fail with `Unavailable`.
    unavailable_calls: u32,
    deleted: Vec<EquipmentId>,
}

impl Default for InMemoryRepositoryState {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
            fail_on_insert: false,
            fail_on_update: false,
            fail_on_delete: false,
            unavailable_calls: 0,
            deleted: Vec::new(),
        }
    }
}

/// In-memory equipment repository with failure injection.
///
/// Clones share the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEquipmentRepository {
    state: Arc<RwLock<InMemoryRepositoryState>>,
}

impl InMemoryEquipmentRepository {
    /// Creates an empty repository that assigns IDs from 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty repository that assigns IDs starting at `first_id`.
    pub fn starting_at(first_id: i64) -> Self {
        let repo = Self::default();
        repo.write().next_id = first_id;
        repo
    }

    /// Configures inserts to fail.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.write().fail_on_insert = fail;
    }

    /// Configures updates to fail.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.write().fail_on_update = fail;
    }

    /// Configures deletes to fail.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.write().fail_on_delete = fail;
    }

    /// Makes the next `calls` operations fail with a transient error.
    pub fn fail_next_calls(&self, calls: u32) {
        self.write().unavailable_calls = calls;
    }

    /// Returns the number of stored records.
    pub fn record_count(&self) -> usize {
        self.read().records.len()
    }

    /// Returns a stored record without going through the async trait.
    pub fn record(&self, id: EquipmentId) -> Option<Equipment> {
        self.read().records.get(&id).cloned()
    }

    /// Returns the IDs removed through [`EquipmentRepository::delete`], in call order.
    pub fn deleted_ids(&self) -> Vec<EquipmentId> {
        self.read().deleted.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryRepositoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryRepositoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InMemoryRepositoryState {
    fn check_available(&mut self) -> Result<()> {
        if self.unavailable_calls > 0 {
            self.unavailable_calls -= 1;
            return Err(RepositoryError::Unavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EquipmentRepository for InMemoryEquipmentRepository {
    async fn insert(&self, record: NewEquipment) -> Result<EquipmentId> {
        let mut state = self.write();
        state.check_available()?;

        if state.fail_on_insert {
            return Err(RepositoryError::Rejected("insert failed".to_string()));
        }

        if state
            .records
            .values()
            .any(|existing| existing.serial_number == record.serial_number)
        {
            return Err(RepositoryError::Conflict(format!(
                "serial number {} already exists",
                record.serial_number
            )));
        }

        let id = EquipmentId::new(state.next_id);
        state.next_id += 1;
        state.records.insert(id, record.into_record(id));
        Ok(id)
    }

    async fn delete(&self, id: EquipmentId) -> Result<()> {
        let mut state = self.write();
        state.check_available()?;

        if state.fail_on_delete {
            return Err(RepositoryError::Rejected("delete failed".to_string()));
        }

        state
            .records
            .remove(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        state.deleted.push(id);
        Ok(())
    }

    async fn get_by_id(&self, id: EquipmentId) -> Result<Option<Equipment>> {
        let mut state = self.write();
        state.check_available()?;
        Ok(state.records.get(&id).cloned())
    }

    async fn update(&self, record: Equipment) -> Result<()> {
        let mut state = self.write();
        state.check_available()?;

        if state.fail_on_update {
            return Err(RepositoryError::Rejected("update failed".to_string()));
        }

        let slot = state
            .records
            .get_mut(&record.id)
            .ok_or(RepositoryError::NotFound(record.id))?;
        *slot = record;
        Ok(())
    }
}

/// In-memory sequence generator.
#[derive(Debug, Clone)]
pub struct InMemorySequenceGenerator {
    next: Arc<AtomicI64>,
    fail: Arc<AtomicBool>,
}

impl Default for InMemorySequenceGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl InMemorySequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(first)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configures the generator to fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the number the next call would hand out.
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SequenceGenerator for InMemorySequenceGenerator {
    async fn next_sequence(&self) -> Result<i64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "sequence source offline".to_string(),
            ));
        }
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
