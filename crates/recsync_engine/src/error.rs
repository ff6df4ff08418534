//! Error types for the sync engine and its collaborators.

use crate::state::SyncPhase;
use recsync_protocol::{CodecError, RecordId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for local store, change tracker and cursor store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a remote store client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server failed to process the request.
    #[error("server error: {0}")]
    Server(String),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl RemoteError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport { retryable, .. } => *retryable,
            RemoteError::Server(_) | RemoteError::NotConnected => true,
            RemoteError::Protocol(_) => false,
        }
    }
}

impl From<CodecError> for RemoteError {
    fn from(err: CodecError) -> Self {
        RemoteError::Protocol(err.to_string())
    }
}

/// Errors reported by local collaborators (store, tracker, cursor store).
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The backend refused the operation.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Terminal errors of a sync run.
///
/// Every variant belongs to exactly one phase, see [`SyncError::phase`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// The change tracker could not enumerate pending mutations.
    #[error("local snapshot failed: {0}")]
    LocalSnapshot(#[source] StoreError),

    /// The push request itself failed.
    #[error("push failed: {0}")]
    Push(#[source] RemoteError),

    /// The server refused a record for a reason other than a conflict.
    #[error("push rejected for record {record_id}: {reason}")]
    PushRejected {
        /// Rejected record.
        record_id: RecordId,
        /// Reason given by the server.
        reason: String,
    },

    /// Reading current server records for conflicted IDs failed.
    #[error("fetching conflicted records failed: {0}")]
    ConflictFetch(#[source] RemoteError),

    /// Conflicts persisted after one resolution and re-push round.
    #[error("unresolved conflict for records {record_ids:?}")]
    UnresolvedConflict {
        /// Records still in conflict.
        record_ids: Vec<RecordId>,
    },

    /// A resolution function returned a record for a different ID.
    #[error("resolution for record {expected} returned record {actual:?}")]
    InvalidResolution {
        /// ID of the conflicted pair.
        expected: RecordId,
        /// ID of the returned record.
        actual: RecordId,
    },

    /// The committed cursor could not be read.
    #[error("reading cursor failed: {0}")]
    CursorRead(#[source] StoreError),

    /// Fetching a page of remote changes failed.
    #[error("pull failed on page {page}: {source}")]
    Pull {
        /// 1-based page number.
        page: usize,
        /// Underlying error.
        #[source]
        source: RemoteError,
    },

    /// A local upsert or delete failed.
    #[error("applying record {record_id} locally failed: {source}")]
    Apply {
        /// Record being written.
        record_id: RecordId,
        /// Underlying error.
        #[source]
        source: StoreError,
    },

    /// The cursor could not be durably committed.
    #[error("cursor commit failed: {0}")]
    Commit(#[source] StoreError),

    /// The change tracker could not be cleared.
    #[error("clearing change tracker failed: {0}")]
    Clear(#[source] StoreError),

    /// The configured conflict policy is not supported.
    #[error("unsupported conflict policy: {0}")]
    UnsupportedPolicy(String),

    /// The engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Returns the phase this error aborted.
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncError::LocalSnapshot(_) => SyncPhase::Snapshot,
            SyncError::Push(_) | SyncError::PushRejected { .. } => SyncPhase::Push,
            SyncError::ConflictFetch(_)
            | SyncError::UnresolvedConflict { .. }
            | SyncError::InvalidResolution { .. } => SyncPhase::ConflictResolution,
            SyncError::CursorRead(_) | SyncError::Pull { .. } => SyncPhase::Pull,
            SyncError::Apply { .. } => SyncPhase::Apply,
            SyncError::Commit(_) | SyncError::Clear(_) => SyncPhase::Commit,
            SyncError::UnsupportedPolicy(_)
            | SyncError::InvalidConfig(_)
            | SyncError::InvalidStateTransition { .. } => SyncPhase::Configuration,
        }
    }

    /// Returns true if re-invoking the run later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Push(e) | SyncError::ConflictFetch(e) => e.is_retryable(),
            SyncError::Pull { source, .. } => source.is_retryable(),
            SyncError::LocalSnapshot(_)
            | SyncError::CursorRead(_)
            | SyncError::Apply { .. }
            | SyncError::Commit(_)
            | SyncError::Clear(_)
            | SyncError::UnresolvedConflict { .. } => true,
            SyncError::PushRejected { .. }
            | SyncError::InvalidResolution { .. }
            | SyncError::UnsupportedPolicy(_)
            | SyncError::InvalidConfig(_)
            | SyncError::InvalidStateTransition { .. } => false,
        }
    }
}
