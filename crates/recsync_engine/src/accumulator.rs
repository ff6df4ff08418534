//! Owned accumulators threaded through the push and pull phases.

use recsync_protocol::{ChangePage, Cursor, Record, RecordId, RecordRef, VersionTag};
use std::collections::{BTreeMap, HashSet};

/// What the push phase got accepted by the remote store.
#[derive(Debug, Clone, Default)]
pub(crate) struct PushReport {
    /// Upserts as finally pushed (resolved versions substituted), in
    /// snapshot order.
    upserts: Vec<Record>,
    /// Accepted items and their new tags.
    accepted: BTreeMap<RecordId, Option<VersionTag>>,
    deletes_accepted: usize,
    conflicts_resolved: usize,
}

impl PushReport {
    pub(crate) fn new(upserts: Vec<Record>) -> Self {
        Self {
            upserts,
            ..Self::default()
        }
    }

    pub(crate) fn accept_upsert(&mut self, id: RecordId, tag: Option<VersionTag>) {
        self.accepted.insert(id, tag);
    }

    pub(crate) fn accept_delete(&mut self) {
        self.deletes_accepted += 1;
    }

    /// Substitutes resolved records into the upsert set, keyed by ID.
    pub(crate) fn merge_resolved(&mut self, resolved: BTreeMap<RecordId, Record>) {
        self.conflicts_resolved += resolved.len();
        for record in &mut self.upserts {
            if let Some(kept) = resolved.get(&record.id) {
                *record = kept.clone();
            }
        }
    }

    /// Upserts not yet accepted by the remote store.
    pub(crate) fn outstanding(&self) -> Vec<Record> {
        self.upserts
            .iter()
            .filter(|r| !self.accepted.contains_key(&r.id))
            .cloned()
            .collect()
    }

    pub(crate) fn upserts(&self) -> &[Record] {
        &self.upserts
    }

    /// Accepted upserts carrying the tag the server assigned.
    ///
    /// A record accepted without a new tag keeps the tag it was pushed with.
    pub(crate) fn acknowledged(&self) -> impl Iterator<Item = Record> + '_ {
        self.upserts.iter().filter_map(|record| {
            let assigned = self.accepted.get(&record.id)?.clone();
            Some(Record {
                version_tag: assigned.or_else(|| record.version_tag.clone()),
                ..record.clone()
            })
        })
    }

    pub(crate) fn upserts_accepted(&self) -> usize {
        self.accepted.len()
    }

    pub(crate) fn deletes_accepted(&self) -> usize {
        self.deletes_accepted
    }

    pub(crate) fn conflicts_resolved(&self) -> usize {
        self.conflicts_resolved
    }
}

/// Changes collected across every page of one pull.
///
/// Nothing is applied until the last page has arrived.
#[derive(Debug, Clone)]
pub(crate) struct PullAccumulator {
    upserted: Vec<Record>,
    deleted: Vec<RecordRef>,
    touched: HashSet<RecordRef>,
    cursor: Cursor,
    pages: usize,
}

impl PullAccumulator {
    pub(crate) fn new(start: Cursor) -> Self {
        Self {
            upserted: Vec::new(),
            deleted: Vec::new(),
            touched: HashSet::new(),
            cursor: start,
            pages: 0,
        }
    }

    /// Appends a page in fetch order and moves the cursor past it.
    pub(crate) fn absorb(&mut self, page: ChangePage) {
        self.touched
            .extend(page.upserted.iter().map(Record::record_ref));
        self.touched.extend(page.deleted.iter().cloned());
        self.upserted.extend(page.upserted);
        self.deleted.extend(page.deleted);
        self.cursor = page.next_cursor;
        self.pages += 1;
    }

    pub(crate) fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub(crate) fn pages(&self) -> usize {
        self.pages
    }

    pub(crate) fn upserted(&self) -> &[Record] {
        &self.upserted
    }

    pub(crate) fn deleted(&self) -> &[RecordRef] {
        &self.deleted
    }

    /// Returns true if any pulled change targets the record.
    pub(crate) fn touches(&self, record: &RecordRef) -> bool {
        self.touched.contains(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_accumulates_in_fetch_order() {
        let mut acc = PullAccumulator::new(Cursor::initial());
        acc.absorb(ChangePage::new(
            vec![Record::new("a", "Note")],
            vec![RecordRef::new("x", "Note")],
            Cursor::new("1"),
            true,
        ));
        acc.absorb(ChangePage::new(
            vec![Record::new("b", "Note")],
            vec![],
            Cursor::new("2"),
            false,
        ));

        let ids: Vec<_> = acc.upserted().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(acc.deleted().len(), 1);
        assert_eq!(acc.cursor(), &Cursor::new("2"));
        assert_eq!(acc.pages(), 2);
        assert!(acc.touches(&RecordRef::new("x", "Note")));
        assert!(!acc.touches(&RecordRef::new("a", "Tag")));
    }

    #[test]
    fn push_report_merge_and_outstanding() {
        let mut report = PushReport::new(vec![
            Record::new("a", "Note").with_field("v", 1),
            Record::new("b", "Note").with_field("v", 1),
        ]);
        report.accept_upsert("a".into(), Some(VersionTag::new("t1")));

        let mut resolved = BTreeMap::new();
        resolved.insert(
            RecordId::from("b"),
            Record::new("b", "Note").with_field("v", 9).with_version_tag("s2"),
        );
        report.merge_resolved(resolved);

        let outstanding = report.outstanding();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].version_tag, Some(VersionTag::new("s2")));
        assert_eq!(report.conflicts_resolved(), 1);

        let acked: Vec<_> = report.acknowledged().collect();
        assert_eq!(acked.len(), 1);
        assert_eq!(acked[0].version_tag, Some(VersionTag::new("t1")));
    }

    #[test]
    fn untagged_acceptance_keeps_pushed_tag() {
        let mut report = PushReport::new(vec![
            Record::new("a", "Note").with_version_tag("old"),
            Record::new("b", "Note"),
        ]);
        report.accept_upsert("a".into(), None);
        report.accept_upsert("b".into(), None);

        let acked: Vec<_> = report.acknowledged().collect();
        assert_eq!(acked.len(), 2);
        assert_eq!(acked[0].version_tag, Some(VersionTag::new("old")));
        assert_eq!(acked[1].version_tag, None);
    }
}
