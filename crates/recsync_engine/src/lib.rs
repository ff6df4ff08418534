//! # recsync engine
//!
//! Client-side record synchronization against a remote record store.
//!
//! This crate provides:
//! - The sync engine and its state machine
//! - Change tracking of local mutations
//! - Two-step (stage, commit) cursor persistence
//! - Conflict resolution policies
//! - Remote store abstraction, HTTP transport and a blocking bridge for
//!   async clients
//!
//! ## Architecture
//!
//! A run is **push-then-pull**:
//! 1. Snapshot pending local mutations
//! 2. Push them, resolving conflicts with one re-push
//! 3. Pull every remote change page from the committed cursor
//! 4. Apply pulled changes locally
//! 5. Commit the new cursor, then clear the pushed mutations
//!
//! ## Key Invariants
//!
//! - Push always happens before pull
//! - The cursor only moves after everything up to it is applied
//! - Local writes are idempotent, so a failed run can simply be re-run
//! - Mutations made during a run are kept for the next one

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accumulator;
mod bridge;
mod config;
mod cursor_store;
mod engine;
mod error;
mod http;
mod local;
mod resolver;
mod state;
mod tracker;
mod transport;

pub use bridge::{AsyncRemoteStoreClient, BlockingRemote};
pub use config::{SyncConfig, DEFAULT_MAX_PULL_PAGES};
pub use cursor_store::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use engine::SyncEngine;
pub use error::{RemoteError, RemoteResult, StoreError, StoreResult, SyncError, SyncResult};
pub use http::{
    CborMessage, HttpClient, HttpRemote, LoopbackClient, LoopbackServer, CHANGES_PATH,
    CURRENT_PATH, PUSH_PATH,
};
pub use local::{LocalStore, MemoryLocalStore};
pub use resolver::{ConflictPolicy, ConflictResolver, ResolveFn};
pub use state::{SyncPhase, SyncReport, SyncState, SyncStats};
pub use tracker::{ChangeTracker, MemoryChangeTracker};
pub use transport::{MockRemote, RemoteCall, RemoteStoreClient};
