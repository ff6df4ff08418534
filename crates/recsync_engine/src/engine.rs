//! The sync engine: one push-then-pull reconciliation cycle per run.

use crate::accumulator::{PullAccumulator, PushReport};
use crate::config::SyncConfig;
use crate::cursor_store::CursorStore;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::local::LocalStore;
use crate::resolver::ConflictResolver;
use crate::state::{SyncReport, SyncState, SyncStats};
use crate::tracker::ChangeTracker;
use crate::transport::RemoteStoreClient;
use parking_lot::{Mutex, RwLock};
use recsync_protocol::{
    ChangeSetSnapshot, ConflictEntry, ConflictSet, PerRecordOutcome, Record, RecordId,
    RecordOutcome,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Reconciles a local replica with a remote record store.
///
/// A run is a single pass:
/// 1. Snapshot pending local mutations
/// 2. Push them in one batch; on conflicts, fetch the server versions,
///    resolve, and re-push exactly once
/// 3. Pull remote change pages from the committed cursor
/// 4. Apply the pulled changes locally, record by record
/// 5. Commit the new cursor, then clear the snapshot from the tracker
///
/// # Invariants
///
/// - Push completes before pull starts
/// - Pages are applied in fetch order, after the last page arrived
/// - The cursor is committed only after every pulled change is applied
/// - The tracker is cleared only after the cursor commit
///
/// The engine assumes exclusive use of its tracker, cursor store and
/// local store while a run is in progress. Overlapping runs on the same
/// engine are refused.
pub struct SyncEngine<T, C, R, L>
where
    T: ChangeTracker,
    C: CursorStore,
    R: RemoteStoreClient,
    L: LocalStore,
{
    config: SyncConfig,
    resolver: ConflictResolver,
    tracker: T,
    cursors: C,
    remote: R,
    local: L,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    run_lock: Mutex<()>,
    runs: AtomicU64,
}

impl<T, C, R, L> SyncEngine<T, C, R, L>
where
    T: ChangeTracker,
    C: CursorStore,
    R: RemoteStoreClient,
    L: LocalStore,
{
    /// Creates a new sync engine.
    ///
    /// Fails with `UnsupportedPolicy` if the configured conflict policy
    /// cannot resolve conflicts.
    pub fn new(config: SyncConfig, tracker: T, cursors: C, remote: R, local: L) -> SyncResult<Self> {
        config.validate()?;

        Ok(Self {
            resolver: ConflictResolver::new(config.conflict_policy.clone()),
            config,
            tracker,
            cursors,
            remote,
            local,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            run_lock: Mutex::new(()),
            runs: AtomicU64::new(0),
        })
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state.read().clone()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the change tracker.
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Gets the cursor store.
    pub fn cursor_store(&self) -> &C {
        &self.cursors
    }

    /// Gets the remote store client.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Gets the local store.
    pub fn local_store(&self) -> &L {
        &self.local
    }

    /// Runs one sync cycle and reports its terminal result to `on_complete`
    /// before returning it.
    pub fn run_with_completion<F>(&self, on_complete: F) -> SyncResult<SyncReport>
    where
        F: FnOnce(&SyncResult<SyncReport>),
    {
        let result = self.run();
        on_complete(&result);
        result
    }

    /// Runs one sync cycle.
    ///
    /// No whole-run retry happens here; after a failure the caller decides
    /// when to run again (see [`SyncError::is_retryable`]).
    pub fn run(&self) -> SyncResult<SyncReport> {
        let Some(_running) = self.run_lock.try_lock() else {
            return Err(SyncError::InvalidStateTransition {
                from: self.state().to_string(),
                to: SyncState::Snapshotting.to_string(),
            });
        };

        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let span = info_span!("sync_run", label = %self.config.label, run);
        let _enter = span.enter();

        let start = Instant::now();
        self.transition(SyncState::Snapshotting)?;

        match self.execute(start) {
            Ok(report) => {
                self.record_success(&report);
                info!(
                    pushed = report.pushed_upserts + report.pushed_deletes,
                    pulled = report.pulled_upserts + report.pulled_deletes,
                    conflicts = report.conflicts_resolved,
                    cursor = %report.cursor,
                    "sync run completed"
                );
                Ok(report)
            }
            Err(error) => {
                self.record_failure(&error);
                Err(error)
            }
        }
    }

    fn execute(&self, start: Instant) -> SyncResult<SyncReport> {
        let snapshot = self.tracker.snapshot().map_err(SyncError::LocalSnapshot)?;
        debug!(
            upserts = snapshot.upserts().len(),
            deletes = snapshot.deleted().len(),
            "captured change set"
        );

        self.transition(SyncState::Pushing)?;
        let pushed = self.push_phase(&snapshot)?;

        self.transition(SyncState::Pulling)?;
        let pulled = self.pull_phase()?;

        self.transition(SyncState::Applying)?;
        self.apply_phase(&pushed, &pulled)?;

        self.transition(SyncState::Committing)?;
        self.cursors.stage(pulled.cursor().clone());
        self.cursors.commit().map_err(SyncError::Commit)?;
        self.tracker.clear(&snapshot).map_err(SyncError::Clear)?;

        self.transition(SyncState::Done)?;

        Ok(SyncReport {
            pushed_upserts: pushed.upserts_accepted(),
            pushed_deletes: pushed.deletes_accepted(),
            conflicts_resolved: pushed.conflicts_resolved(),
            pages_pulled: pulled.pages(),
            pulled_upserts: pulled.upserted().len(),
            pulled_deletes: pulled.deleted().len(),
            cursor: pulled.cursor().clone(),
            duration: start.elapsed(),
        })
    }

    /// Pushes the snapshot, resolving and re-pushing conflicts once.
    fn push_phase(&self, snapshot: &ChangeSetSnapshot) -> SyncResult<PushReport> {
        let mut report = PushReport::new(snapshot.upserts().to_vec());

        if snapshot.is_empty() {
            debug!("nothing to push");
            return Ok(report);
        }

        let deletes = snapshot.deleted_ids();
        let outcomes = self
            .remote
            .push(snapshot.upserts(), &deletes)
            .map_err(SyncError::Push)?;
        let conflicted = Self::collect_outcomes(&mut report, outcomes, snapshot.upserts(), &deletes)?;

        if conflicted.is_empty() {
            debug!(accepted = snapshot.len(), "push accepted");
            return Ok(report);
        }

        self.transition(SyncState::ConflictResolving)?;
        warn!(conflicts = conflicted.len(), "push reported version conflicts");

        let unresolvable: Vec<RecordId> = deletes
            .iter()
            .filter(|id| conflicted.contains(*id))
            .cloned()
            .collect();
        if !unresolvable.is_empty() {
            return Err(SyncError::UnresolvedConflict {
                record_ids: unresolvable,
            });
        }

        let conflicts = self.fetch_conflicts(report.upserts(), &conflicted)?;
        let resolved = self.resolver.resolve_all(conflicts)?;
        report.merge_resolved(resolved);

        self.transition(SyncState::Pushing)?;
        let retry = report.outstanding();
        debug!(records = retry.len(), "re-pushing resolved records");

        let outcomes = self.remote.push(&retry, &[]).map_err(SyncError::Push)?;
        let still_conflicted = Self::collect_outcomes(&mut report, outcomes, &retry, &[])?;

        if !still_conflicted.is_empty() {
            return Err(SyncError::UnresolvedConflict {
                record_ids: still_conflicted.into_iter().collect(),
            });
        }

        Ok(report)
    }

    /// Folds one push round into the report; returns the conflicted IDs.
    ///
    /// A rejected item, or an item the server reported nothing for, aborts
    /// the run.
    fn collect_outcomes(
        report: &mut PushReport,
        outcomes: Vec<RecordOutcome>,
        upserts: &[Record],
        deletes: &[RecordId],
    ) -> SyncResult<BTreeSet<RecordId>> {
        let upsert_ids: BTreeSet<&RecordId> = upserts.iter().map(|r| &r.id).collect();
        let delete_ids: BTreeSet<&RecordId> = deletes.iter().collect();
        let mut reported: BTreeSet<RecordId> = BTreeSet::new();
        let mut conflicted = BTreeSet::new();

        for RecordOutcome { id, outcome } in outcomes {
            let is_upsert = upsert_ids.contains(&id);
            if !is_upsert && !delete_ids.contains(&id) {
                warn!(record = %id, "push outcome for a record that was not sent");
                continue;
            }

            match outcome {
                PerRecordOutcome::Accepted(tag) => {
                    if is_upsert {
                        report.accept_upsert(id.clone(), tag);
                    } else {
                        report.accept_delete();
                    }
                }
                PerRecordOutcome::Conflicted => {
                    conflicted.insert(id.clone());
                }
                PerRecordOutcome::Rejected(reason) => {
                    return Err(SyncError::PushRejected {
                        record_id: id,
                        reason,
                    });
                }
            }
            reported.insert(id);
        }

        let missing = upsert_ids
            .into_iter()
            .chain(delete_ids)
            .find(|id| !reported.contains(*id));
        if let Some(id) = missing {
            return Err(SyncError::PushRejected {
                record_id: id.clone(),
                reason: "no outcome reported".into(),
            });
        }

        Ok(conflicted)
    }

    /// Reads the server version of every conflicted record in one call.
    fn fetch_conflicts(
        &self,
        upserts: &[Record],
        conflicted: &BTreeSet<RecordId>,
    ) -> SyncResult<ConflictSet> {
        let ids: Vec<RecordId> = conflicted.iter().cloned().collect();
        let server_records = self
            .remote
            .fetch_current(&ids)
            .map_err(SyncError::ConflictFetch)?;

        let mut by_id: BTreeMap<RecordId, Record> = server_records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        let mut conflicts = ConflictSet::new();
        let mut missing = Vec::new();

        for client in upserts.iter().filter(|r| conflicted.contains(&r.id)) {
            match by_id.remove(&client.id) {
                Some(server) => {
                    if let Err(entry) = conflicts.insert(ConflictEntry::new(client.clone(), server)) {
                        missing.push(entry.client.id);
                    }
                }
                None => missing.push(client.id.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(SyncError::UnresolvedConflict {
                record_ids: missing,
            });
        }

        Ok(conflicts)
    }

    /// Fetches every remote page from the committed cursor.
    fn pull_phase(&self) -> SyncResult<PullAccumulator> {
        let start = self.cursors.current().map_err(SyncError::CursorRead)?;
        let mut acc = PullAccumulator::new(start);

        loop {
            let page_number = acc.pages() + 1;
            if acc.pages() >= self.config.max_pull_pages {
                return Err(SyncError::Pull {
                    page: page_number,
                    source: RemoteError::Protocol(format!(
                        "more than {} pages in one pull",
                        self.config.max_pull_pages
                    )),
                });
            }

            let page = self
                .remote
                .fetch_changes(acc.cursor())
                .map_err(|source| SyncError::Pull {
                    page: page_number,
                    source,
                })?;

            debug!(
                page = page_number,
                upserts = page.upserted.len(),
                deletes = page.deleted.len(),
                has_more = page.has_more,
                "fetched change page"
            );

            let has_more = page.has_more;
            acc.absorb(page);
            if !has_more {
                break;
            }
        }

        Ok(acc)
    }

    /// Writes pulled changes locally: upserts first, then deletions.
    ///
    /// Accepted pushed records the pull did not return are written first so
    /// the local copy carries the tag the server assigned. Every write is
    /// durable on its own; the first failure stops the phase and leaves the
    /// written prefix in place.
    fn apply_phase(&self, pushed: &PushReport, pulled: &PullAccumulator) -> SyncResult<()> {
        for record in pushed.acknowledged() {
            if pulled.touches(&record.record_ref()) {
                continue;
            }
            self.local.upsert(&record).map_err(|source| SyncError::Apply {
                record_id: record.id.clone(),
                source,
            })?;
        }

        for record in pulled.upserted() {
            self.local.upsert(record).map_err(|source| SyncError::Apply {
                record_id: record.id.clone(),
                source,
            })?;
        }

        for record in pulled.deleted() {
            self.local.delete(record).map_err(|source| SyncError::Apply {
                record_id: record.id.clone(),
                source,
            })?;
        }

        debug!(
            upserts = pulled.upserted().len(),
            deletes = pulled.deleted().len(),
            "applied pulled changes"
        );
        Ok(())
    }

    fn transition(&self, next: SyncState) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_transition_to(&next) {
            return Err(SyncError::InvalidStateTransition {
                from: state.to_string(),
                to: next.to_string(),
            });
        }
        let from = state.to_string();
        debug!(%from, to = %next, "state transition");
        *state = next;
        Ok(())
    }

    fn record_success(&self, report: &SyncReport) {
        let mut stats = self.stats.write();
        stats.runs_completed += 1;
        stats.records_pushed += (report.pushed_upserts + report.pushed_deletes) as u64;
        stats.records_pulled += (report.pulled_upserts + report.pulled_deletes) as u64;
        stats.conflicts_resolved += report.conflicts_resolved as u64;
        stats.last_sync_time = Some(Instant::now());
        stats.last_error = None;
    }

    fn record_failure(&self, error: &SyncError) {
        warn!(phase = %error.phase(), error = %error, "sync run failed");

        {
            let mut state = self.state.write();
            if state.is_active() {
                *state = SyncState::Failed {
                    phase: error.phase(),
                    reason: error.to_string(),
                };
            }
        }

        let mut stats = self.stats.write();
        stats.runs_failed += 1;
        stats.last_error = Some(error.to_string());
    }
}
