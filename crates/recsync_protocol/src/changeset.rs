//! Point-in-time captures of pending local mutations.

use crate::record::{Record, RecordId, RecordRef};
use serde::{Deserialize, Serialize};

/// An immutable capture of local mutations pending push.
///
/// Once captured, a snapshot is the exclusive basis for the push phase
/// of a run; the tracker is never re-queried mid-cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSetSnapshot {
    upserts: Vec<Record>,
    deleted: Vec<RecordRef>,
}

impl ChangeSetSnapshot {
    /// Creates a snapshot from locally inserted/updated records and
    /// locally deleted record references.
    pub fn new(upserts: Vec<Record>, deleted: Vec<RecordRef>) -> Self {
        Self { upserts, deleted }
    }

    /// Creates an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records inserted or updated locally, in server representation.
    pub fn upserts(&self) -> &[Record] {
        &self.upserts
    }

    /// Records deleted locally.
    pub fn deleted(&self) -> &[RecordRef] {
        &self.deleted
    }

    /// IDs of records deleted locally.
    pub fn deleted_ids(&self) -> Vec<RecordId> {
        self.deleted.iter().map(|r| r.id.clone()).collect()
    }

    /// Returns true if there is nothing to push.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deleted.is_empty()
    }

    /// Total number of mutations in the snapshot.
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deleted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        let snapshot = ChangeSetSnapshot::empty();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
        assert!(snapshot.deleted_ids().is_empty());
    }

    #[test]
    fn deleted_ids_follow_capture_order() {
        let snapshot = ChangeSetSnapshot::new(
            vec![Record::new("a", "Note")],
            vec![RecordRef::new("x", "Note"), RecordRef::new("y", "Tag")],
        );

        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.len(), 3);
        assert_eq!(
            snapshot.deleted_ids(),
            vec![RecordId::from("x"), RecordId::from("y")]
        );
    }
}
