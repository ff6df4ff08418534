//! # recsync Protocol
//!
//! Record, cursor and message types shared by the recsync engine and
//! reference server.
//!
//! This crate provides:
//! - `Record` and its typed identifiers (`RecordId`, `EntityType`, `VersionTag`)
//! - `ChangeSetSnapshot` for pending local mutations
//! - `Cursor` for positions in the remote change stream
//! - `ConflictEntry` / `ConflictSet` for version mismatches reported by push
//! - Push / fetch messages with CBOR encoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changeset;
mod conflict;
mod cursor;
mod error;
mod messages;
mod record;

pub use changeset::ChangeSetSnapshot;
pub use conflict::{ConflictEntry, ConflictSet};
pub use cursor::Cursor;
pub use error::{CodecError, CodecResult};
pub use messages::{
    ChangePage, FetchChangesRequest, FetchCurrentRequest, FetchCurrentResponse,
    PerRecordOutcome, PushItemStatus, PushRequest, PushResponse, RecordOutcome,
};
pub use record::{EntityType, Fields, Record, RecordId, RecordRef, VersionTag};
