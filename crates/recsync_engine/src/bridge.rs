//! Blocking bridge over asynchronous remote clients.

use crate::error::RemoteResult;
use crate::transport::RemoteStoreClient;
use recsync_protocol::{ChangePage, Cursor, Record, RecordId, RecordOutcome};
use std::future::Future;
use std::io;
use tokio::runtime::{Builder, Runtime};

/// An asynchronous client for the remote record store.
///
/// Same contract as [`RemoteStoreClient`]: each future resolves only once
/// the whole result of the call is known.
pub trait AsyncRemoteStoreClient: Send + Sync {
    /// Upserts and deletes records in one batched request.
    fn push(
        &self,
        upserts: &[Record],
        deletes: &[RecordId],
    ) -> impl Future<Output = RemoteResult<Vec<RecordOutcome>>> + Send;

    /// Fetches the next page of changes after `since`.
    fn fetch_changes(&self, since: &Cursor) -> impl Future<Output = RemoteResult<ChangePage>> + Send;

    /// Reads the current server version of each record.
    fn fetch_current(&self, ids: &[RecordId]) -> impl Future<Output = RemoteResult<Vec<Record>>> + Send;
}

/// Drives an [`AsyncRemoteStoreClient`] to completion on a private runtime.
///
/// Each call blocks the calling thread until its future resolves, so the
/// engine sees a plain [`RemoteStoreClient`]. Must not be called from
/// inside another tokio runtime.
pub struct BlockingRemote<C> {
    client: C,
    runtime: Runtime,
}

impl<C: AsyncRemoteStoreClient> BlockingRemote<C> {
    /// Wraps `client` with a dedicated runtime.
    pub fn new(client: C) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("recsync-remote")
            .enable_all()
            .build()?;
        Ok(Self { client, runtime })
    }

    /// Returns the wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: AsyncRemoteStoreClient> RemoteStoreClient for BlockingRemote<C> {
    fn push(&self, upserts: &[Record], deletes: &[RecordId]) -> RemoteResult<Vec<RecordOutcome>> {
        self.runtime.block_on(self.client.push(upserts, deletes))
    }

    fn fetch_changes(&self, since: &Cursor) -> RemoteResult<ChangePage> {
        self.runtime.block_on(self.client.fetch_changes(since))
    }

    fn fetch_current(&self, ids: &[RecordId]) -> RemoteResult<Vec<Record>> {
        self.runtime.block_on(self.client.fetch_current(ids))
    }
}
