//! Protocol messages for push and fetch.
//!
//! Messages are plain serde types; `encode`/`decode` use CBOR so the
//! same bodies travel over any byte transport.

use crate::cursor::Cursor;
use crate::error::{CodecError, CodecResult};
use crate::record::{Record, RecordId, RecordRef, VersionTag};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn to_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

macro_rules! cbor_message {
    ($($name:ident),* $(,)?) => {
        $(
            impl $name {
                /// Encodes to CBOR.
                pub fn encode(&self) -> CodecResult<Vec<u8>> {
                    to_cbor(self)
                }

                /// Decodes from CBOR.
                pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
                    from_cbor(bytes)
                }
            }
        )*
    };
}

/// Result of pushing one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerRecordOutcome {
    /// The server stored the write. Upserts carry the new version tag;
    /// deletions carry none.
    Accepted(Option<VersionTag>),
    /// The version tag the client assumed no longer matches the server's.
    Conflicted,
    /// The server refused the write for a reason other than a conflict.
    Rejected(String),
}

impl PerRecordOutcome {
    /// Returns true if the write was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, PerRecordOutcome::Accepted(_))
    }

    /// Returns true if the write hit a version conflict.
    pub fn is_conflicted(&self) -> bool {
        matches!(self, PerRecordOutcome::Conflicted)
    }
}

/// A push outcome paired with the record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Record ID.
    pub id: RecordId,
    /// What happened to the write.
    pub outcome: PerRecordOutcome,
}

impl RecordOutcome {
    /// Creates an accepted outcome.
    pub fn accepted(id: impl Into<RecordId>, tag: Option<VersionTag>) -> Self {
        Self {
            id: id.into(),
            outcome: PerRecordOutcome::Accepted(tag),
        }
    }

    /// Creates a conflicted outcome.
    pub fn conflicted(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            outcome: PerRecordOutcome::Conflicted,
        }
    }

    /// Creates a rejected outcome.
    pub fn rejected(id: impl Into<RecordId>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcome: PerRecordOutcome::Rejected(reason.into()),
        }
    }
}

/// Per-item status carried in a push response body.
///
/// Statuses follow HTTP semantics: `200` accepted, `409` version
/// conflict, anything else is a rejection described by `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushItemStatus {
    /// Record ID.
    pub id: RecordId,
    /// Status code.
    pub status: u16,
    /// New version tag for accepted upserts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_tag: Option<VersionTag>,
    /// Error message for rejected items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PushItemStatus {
    /// Item was stored.
    pub const OK: u16 = 200;
    /// Item's version tag did not match the server's.
    pub const CONFLICT: u16 = 409;

    /// Creates a status for an accepted item.
    pub fn ok(id: RecordId, version_tag: Option<VersionTag>) -> Self {
        Self {
            id,
            status: Self::OK,
            version_tag,
            message: None,
        }
    }

    /// Creates a status for a conflicted item.
    pub fn conflict(id: RecordId) -> Self {
        Self {
            id,
            status: Self::CONFLICT,
            version_tag: None,
            message: None,
        }
    }

    /// Creates a status for a rejected item.
    pub fn error(id: RecordId, status: u16, message: impl Into<String>) -> Self {
        Self {
            id,
            status,
            version_tag: None,
            message: Some(message.into()),
        }
    }

    /// Converts the wire status into a push outcome.
    pub fn into_outcome(self) -> RecordOutcome {
        let outcome = match self.status {
            Self::OK => PerRecordOutcome::Accepted(self.version_tag),
            Self::CONFLICT => PerRecordOutcome::Conflicted,
            status => PerRecordOutcome::Rejected(
                self.message
                    .unwrap_or_else(|| format!("push rejected with status {}", status)),
            ),
        };
        RecordOutcome {
            id: self.id,
            outcome,
        }
    }
}

/// Batched upsert/delete request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Records to insert or update.
    pub upserts: Vec<Record>,
    /// IDs of records to delete.
    pub deletes: Vec<RecordId>,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(upserts: Vec<Record>, deletes: Vec<RecordId>) -> Self {
        Self { upserts, deletes }
    }

    /// Returns the number of items in the request.
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    /// Returns true if the request carries no items.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Response to a push request: one status per item, upserts first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Per-item statuses.
    pub items: Vec<PushItemStatus>,
}

impl PushResponse {
    /// Creates a push response.
    pub fn new(items: Vec<PushItemStatus>) -> Self {
        Self { items }
    }

    /// Converts every item status into a push outcome.
    pub fn into_outcomes(self) -> Vec<RecordOutcome> {
        self.items
            .into_iter()
            .map(PushItemStatus::into_outcome)
            .collect()
    }
}

/// Request for the next page of remote changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchChangesRequest {
    /// Position after which changes are wanted.
    pub since: Cursor,
}

impl FetchChangesRequest {
    /// Creates a new fetch request.
    pub fn new(since: Cursor) -> Self {
        Self { since }
    }
}

/// One page of the remote change stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangePage {
    /// Records inserted or updated remotely, in stream order.
    pub upserted: Vec<Record>,
    /// Records deleted remotely, in stream order.
    pub deleted: Vec<RecordRef>,
    /// Cursor positioned after this page.
    pub next_cursor: Cursor,
    /// Whether more pages follow.
    pub has_more: bool,
}

impl ChangePage {
    /// Creates a page.
    pub fn new(
        upserted: Vec<Record>,
        deleted: Vec<RecordRef>,
        next_cursor: Cursor,
        has_more: bool,
    ) -> Self {
        Self {
            upserted,
            deleted,
            next_cursor,
            has_more,
        }
    }

    /// Creates the final, empty page at the given cursor.
    pub fn empty(next_cursor: Cursor) -> Self {
        Self::new(Vec::new(), Vec::new(), next_cursor, false)
    }

    /// Total number of changes in the page.
    pub fn len(&self) -> usize {
        self.upserted.len() + self.deleted.len()
    }

    /// Returns true if the page carries no changes.
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.deleted.is_empty()
    }
}

/// Batched read of current server records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCurrentRequest {
    /// IDs to read.
    pub ids: Vec<RecordId>,
}

impl FetchCurrentRequest {
    /// Creates a new read request.
    pub fn new(ids: Vec<RecordId>) -> Self {
        Self { ids }
    }
}

/// Current server records; IDs that no longer exist are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchCurrentResponse {
    /// Records found.
    pub records: Vec<Record>,
}

impl FetchCurrentResponse {
    /// Creates a new read response.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

cbor_message!(
    PushRequest,
    PushResponse,
    FetchChangesRequest,
    ChangePage,
    FetchCurrentRequest,
    FetchCurrentResponse,
);
