//! Sync run state machine, statistics and per-run report.

use recsync_protocol::Cursor;
use std::fmt;
use std::time::{Duration, Instant};

/// A phase of the sync protocol, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Engine or policy configuration.
    Configuration,
    /// Capturing local mutations.
    Snapshot,
    /// Sending local mutations to the remote store.
    Push,
    /// Fetching, resolving and re-pushing conflicted records.
    ConflictResolution,
    /// Fetching remote change pages.
    Pull,
    /// Writing pulled changes locally.
    Apply,
    /// Committing the cursor and clearing the change tracker.
    Commit,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Configuration => "configuration",
            SyncPhase::Snapshot => "snapshot",
            SyncPhase::Push => "push",
            SyncPhase::ConflictResolution => "conflict-resolution",
            SyncPhase::Pull => "pull",
            SyncPhase::Apply => "apply",
            SyncPhase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// The current state of a sync run.
///
/// `Idle → Snapshotting → Pushing → (ConflictResolving → Pushing)? →
/// Pulling → Applying → Committing → Done`, with any active state able
/// to move to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No run in progress.
    Idle,
    /// Capturing the change set snapshot.
    Snapshotting,
    /// Pushing local mutations.
    Pushing,
    /// Resolving conflicts reported by the first push.
    ConflictResolving,
    /// Fetching remote change pages.
    Pulling,
    /// Applying pulled changes locally.
    Applying,
    /// Committing the cursor and clearing the tracker.
    Committing,
    /// The run completed successfully.
    Done,
    /// The run aborted.
    Failed {
        /// Phase that failed.
        phase: SyncPhase,
        /// Error message.
        reason: String,
    },
}

impl SyncState {
    /// Returns true if a run is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            SyncState::Idle | SyncState::Done | SyncState::Failed { .. }
        )
    }

    /// Returns true if this state ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Failed { .. })
    }

    /// Returns true if a new run can start from this state.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: &SyncState) -> bool {
        use SyncState::*;

        if let Failed { .. } = next {
            return self.is_active();
        }

        matches!(
            (self, next),
            (Idle | Done | Failed { .. }, Snapshotting)
                | (Snapshotting, Pushing)
                | (Pushing, ConflictResolving)
                | (ConflictResolving, Pushing)
                | (Pushing, Pulling)
                | (Pulling, Applying)
                | (Applying, Committing)
                | (Committing, Done)
        )
    }

    fn name(&self) -> &'static str {
        match self {
            SyncState::Idle => "Idle",
            SyncState::Snapshotting => "Snapshotting",
            SyncState::Pushing => "Pushing",
            SyncState::ConflictResolving => "ConflictResolving",
            SyncState::Pulling => "Pulling",
            SyncState::Applying => "Applying",
            SyncState::Committing => "Committing",
            SyncState::Done => "Done",
            SyncState::Failed { .. } => "Failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Failed { phase, reason } => write!(f, "Failed({}: {})", phase, reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Cumulative statistics across runs of one engine.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that reached `Done`.
    pub runs_completed: u64,
    /// Runs that ended in `Failed`.
    pub runs_failed: u64,
    /// Records pushed (upserts and deletions).
    pub records_pushed: u64,
    /// Records pulled (upserts and deletions).
    pub records_pulled: u64,
    /// Conflicts resolved.
    pub conflicts_resolved: u64,
    /// Last successful run time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Upserts accepted by the remote store.
    pub pushed_upserts: usize,
    /// Deletions accepted by the remote store.
    pub pushed_deletes: usize,
    /// Conflicts resolved before the re-push.
    pub conflicts_resolved: usize,
    /// Pages fetched during pull.
    pub pages_pulled: usize,
    /// Upserts applied locally from the pull.
    pub pulled_upserts: usize,
    /// Deletions applied locally from the pull.
    pub pulled_deletes: usize,
    /// Cursor committed at the end of the run.
    pub cursor: Cursor,
    /// Duration of the run.
    pub duration: Duration,
}
