//! # recsync server
//!
//! Reference remote record store for the recsync engine.
//!
//! This crate provides:
//! - A versioned record store with a sequence-ordered change feed
//! - Per-record optimistic concurrency on push (stale tags conflict)
//! - Request handlers for the push, change feed and current-record
//!   endpoints, with CBOR body dispatch for in-process transports
//!
//! # Protocol
//!
//! Cursors are decimal sequence numbers. The change feed holds only the
//! latest change per record, so a client that pulls from an old cursor
//! sees each record at most once.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::RecordServer;
pub use store::{Change, PushConflict, RecordStore};
