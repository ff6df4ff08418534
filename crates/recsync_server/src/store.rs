//! Versioned record storage with a sequence-ordered change feed.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use recsync_protocol::{ChangePage, Cursor, Record, RecordId, RecordRef, VersionTag};
use std::collections::{BTreeMap, HashMap};

/// A change in the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// The record was inserted or updated.
    Upsert(Record),
    /// The record was deleted.
    Delete(RecordRef),
}

impl Change {
    fn id(&self) -> &RecordId {
        match self {
            Change::Upsert(record) => &record.id,
            Change::Delete(record) => &record.id,
        }
    }
}

/// Why an upsert was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConflict {
    /// Tag sent by the client.
    pub client_tag: Option<VersionTag>,
    /// Tag currently stored.
    pub server_tag: Option<VersionTag>,
}

#[derive(Default)]
struct Inner {
    /// Current records.
    records: HashMap<RecordId, Record>,
    /// Latest change per record, keyed by sequence.
    feed: BTreeMap<u64, Change>,
    /// Sequence of each record's entry in `feed`.
    positions: HashMap<RecordId, u64>,
    /// Last assigned sequence.
    sequence: u64,
}

impl Inner {
    fn append(&mut self, change: Change) -> u64 {
        self.sequence += 1;
        let seq = self.sequence;
        if let Some(previous) = self.positions.insert(change.id().clone(), seq) {
            self.feed.remove(&previous);
        }
        self.feed.insert(seq, change);
        seq
    }
}

/// Server-side record store.
///
/// Every accepted write gets the next sequence number and a fresh version
/// tag. The feed keeps only the latest change per record.
pub struct RecordStore {
    inner: RwLock<Inner>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Returns the last assigned sequence number.
    pub fn sequence(&self) -> u64 {
        self.inner.read().sequence
    }

    /// Returns the cursor positioned after every change.
    pub fn head(&self) -> Cursor {
        Cursor::new(self.sequence().to_string())
    }

    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Returns the stored record.
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.inner.read().records.get(id).cloned()
    }

    /// Stores `record` if its tag matches the stored one.
    ///
    /// A record that does not exist yet is accepted whatever its tag. An
    /// existing record must be written with its current tag.
    pub fn upsert(&self, record: Record) -> Result<VersionTag, PushConflict> {
        let mut inner = self.inner.write();

        if let Some(stored) = inner.records.get(&record.id) {
            if record.version_tag.is_none() || stored.version_tag != record.version_tag {
                return Err(PushConflict {
                    client_tag: record.version_tag,
                    server_tag: stored.version_tag.clone(),
                });
            }
        }

        let tag = VersionTag::new(format!("v{}", inner.sequence + 1));
        let stored = Record {
            version_tag: Some(tag.clone()),
            ..record
        };
        inner.records.insert(stored.id.clone(), stored.clone());
        inner.append(Change::Upsert(stored));
        Ok(tag)
    }

    /// Deletes the record; deleting a missing record is a no-op.
    ///
    /// Returns true if a record was removed.
    pub fn delete(&self, id: &RecordId) -> bool {
        let mut inner = self.inner.write();
        match inner.records.remove(id) {
            Some(removed) => {
                inner.append(Change::Delete(removed.record_ref()));
                true
            }
            None => false,
        }
    }

    /// Returns the current version of each known ID, in request order.
    pub fn current(&self, ids: &[RecordId]) -> Vec<Record> {
        let inner = self.inner.read();
        ids.iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Returns up to `limit` changes after `since`.
    pub fn changes_since(&self, since: &Cursor, limit: usize) -> ServerResult<ChangePage> {
        let from = parse_cursor(since)?;
        let inner = self.inner.read();

        if from > inner.sequence {
            return Err(ServerError::InvalidCursor(since.token().to_string()));
        }

        let mut pending = inner.feed.range(from + 1..);
        let mut upserted = Vec::new();
        let mut deleted = Vec::new();
        let mut last = from;

        for (seq, change) in pending.by_ref().take(limit.max(1)) {
            match change {
                Change::Upsert(record) => upserted.push(record.clone()),
                Change::Delete(record) => deleted.push(record.clone()),
            }
            last = *seq;
        }

        let has_more = pending.next().is_some();
        let next_cursor = if last == from {
            since.clone()
        } else {
            Cursor::new(last.to_string())
        };

        Ok(ChangePage::new(upserted, deleted, next_cursor, has_more))
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cursor(cursor: &Cursor) -> ServerResult<u64> {
    if cursor.is_initial() {
        return Ok(0);
    }
    cursor
        .token()
        .parse()
        .map_err(|_| ServerError::InvalidCursor(cursor.token().to_string()))
}
