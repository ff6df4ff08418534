//! Local change tracking.

use crate::error::StoreResult;
use parking_lot::RwLock;
use recsync_protocol::{ChangeSetSnapshot, Record, RecordId, RecordRef};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Records local mutations made since the last successful run.
pub trait ChangeTracker: Send + Sync {
    /// Captures all pending mutations.
    fn snapshot(&self) -> StoreResult<ChangeSetSnapshot>;

    /// Forgets the mutations captured in `snapshot`.
    ///
    /// Mutations recorded after the snapshot was taken must survive.
    /// Clearing the same snapshot twice is a no-op.
    fn clear(&self, snapshot: &ChangeSetSnapshot) -> StoreResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
enum PendingChange {
    Upsert(Record),
    Delete(RecordRef),
}

/// An in-memory change tracker.
///
/// Keeps only the latest mutation per record (entity type and ID): an
/// upsert followed by a delete of the same record is pushed as a delete.
///
/// The remote store addresses records by ID alone, so a snapshot carries
/// at most one mutation per ID. When records of different entity types
/// share an ID, the others stay pending for the next run.
#[derive(Debug, Default)]
pub struct MemoryChangeTracker {
    pending: RwLock<BTreeMap<RecordRef, PendingChange>>,
}

impl MemoryChangeTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a local insert or update.
    pub fn record_upsert(&self, record: Record) {
        self.pending
            .write()
            .insert(record.record_ref(), PendingChange::Upsert(record));
    }

    /// Records a local deletion.
    pub fn record_delete(&self, record: RecordRef) {
        self.pending
            .write()
            .insert(record.clone(), PendingChange::Delete(record));
    }

    /// Returns the number of records with pending mutations.
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    /// Returns true if a record with this ID, of any entity type, has a
    /// pending mutation.
    pub fn is_pending(&self, id: &RecordId) -> bool {
        self.pending.read().keys().any(|record| &record.id == id)
    }

    /// Returns true if the record has a pending mutation.
    pub fn is_pending_ref(&self, record: &RecordRef) -> bool {
        self.pending.read().contains_key(record)
    }
}

impl ChangeTracker for MemoryChangeTracker {
    fn snapshot(&self) -> StoreResult<ChangeSetSnapshot> {
        let pending = self.pending.read();
        let mut upserts = Vec::new();
        let mut deleted = Vec::new();
        let mut captured: BTreeSet<&RecordId> = BTreeSet::new();

        for (record, change) in pending.iter() {
            if !captured.insert(&record.id) {
                debug!(
                    record = %record.id,
                    entity_type = %record.entity_type,
                    "id already captured, deferring to the next run"
                );
                continue;
            }
            match change {
                PendingChange::Upsert(record) => upserts.push(record.clone()),
                PendingChange::Delete(record) => deleted.push(record.clone()),
            }
        }

        Ok(ChangeSetSnapshot::new(upserts, deleted))
    }

    fn clear(&self, snapshot: &ChangeSetSnapshot) -> StoreResult<()> {
        let mut pending = self.pending.write();

        for record in snapshot.upserts() {
            let key = record.record_ref();
            if pending.get(&key) == Some(&PendingChange::Upsert(record.clone())) {
                pending.remove(&key);
            }
        }
        for record in snapshot.deleted() {
            if pending.get(record) == Some(&PendingChange::Delete(record.clone())) {
                pending.remove(record);
            }
        }

        Ok(())
    }
}
