//! Conflicts reported by the push phase.

use crate::record::{Record, RecordId};
use std::collections::BTreeMap;

/// A client and server version of the same record.
///
/// Populated only when a push reports that the version tag the client
/// assumed no longer matches the server's.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictEntry {
    /// The version the client attempted to write.
    pub client: Record,
    /// The version currently stored on the server.
    pub server: Record,
}

impl ConflictEntry {
    /// Creates a new conflict entry.
    pub fn new(client: Record, server: Record) -> Self {
        Self { client, server }
    }

    /// Returns the ID shared by both versions.
    pub fn id(&self) -> &RecordId {
        &self.client.id
    }
}

/// Conflicts collected during one push round, keyed by record ID.
///
/// Iteration order is by record ID, so resolution is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictSet {
    entries: BTreeMap<RecordId, ConflictEntry>,
}

impl ConflictSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a conflict, replacing any previous entry for the same ID.
    ///
    /// Both versions must refer to the same record; mismatched pairs are
    /// refused and returned unchanged.
    pub fn insert(&mut self, entry: ConflictEntry) -> Result<(), ConflictEntry> {
        if entry.client.id != entry.server.id {
            return Err(entry);
        }
        self.entries.insert(entry.id().clone(), entry);
        Ok(())
    }

    /// Returns the conflict for an ID.
    pub fn get(&self, id: &RecordId) -> Option<&ConflictEntry> {
        self.entries.get(id)
    }

    /// Returns the conflicted IDs.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.entries.keys()
    }

    /// Returns the number of conflicts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no conflicts.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for ConflictSet {
    type Item = ConflictEntry;
    type IntoIter = std::collections::btree_map::IntoValues<RecordId, ConflictEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
