//! Local replica store.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use recsync_protocol::{EntityType, Record, RecordId, RecordRef};
use std::collections::{BTreeMap, HashSet};

/// The local side of the replica.
///
/// Each call must be durable on return; the engine writes record by
/// record and stops at the first failure. Both operations must be
/// idempotent because a failed run re-applies the same pulled changes.
pub trait LocalStore: Send + Sync {
    /// Inserts the record, or replaces the stored record with the same
    /// entity type and ID.
    fn upsert(&self, record: &Record) -> StoreResult<()>;

    /// Deletes the record if present.
    fn delete(&self, record: &RecordRef) -> StoreResult<()>;
}

/// An in-memory local store keyed per entity type.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    records: RwLock<BTreeMap<(EntityType, RecordId), Record>>,
    failing: RwLock<HashSet<RecordId>>,
    writes: RwLock<u64>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored record.
    pub fn get(&self, record: &RecordRef) -> Option<Record> {
        self.records
            .read()
            .get(&(record.entity_type.clone(), record.id.clone()))
            .cloned()
    }

    /// Returns all stored records ordered by entity type and ID.
    pub fn records(&self) -> Vec<Record> {
        self.records.read().values().cloned().collect()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns the number of successful writes (upserts and deletes).
    pub fn write_count(&self) -> u64 {
        *self.writes.read()
    }

    /// Makes every write touching `id` fail until cleared.
    pub fn set_fail_on(&self, id: impl Into<RecordId>) {
        self.failing.write().insert(id.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    fn check_failure(&self, id: &RecordId) -> StoreResult<()> {
        if self.failing.read().contains(id) {
            return Err(StoreError::backend(format!("write to {} refused", id)));
        }
        Ok(())
    }
}

impl LocalStore for MemoryLocalStore {
    fn upsert(&self, record: &Record) -> StoreResult<()> {
        self.check_failure(&record.id)?;
        self.records.write().insert(
            (record.entity_type.clone(), record.id.clone()),
            record.clone(),
        );
        *self.writes.write() += 1;
        Ok(())
    }

    fn delete(&self, record: &RecordRef) -> StoreResult<()> {
        self.check_failure(&record.id)?;
        self.records
            .write()
            .remove(&(record.entity_type.clone(), record.id.clone()));
        *self.writes.write() += 1;
        Ok(())
    }
}
