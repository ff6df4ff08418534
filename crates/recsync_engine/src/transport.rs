//! Remote store abstraction.

use crate::error::{RemoteError, RemoteResult};
use parking_lot::Mutex;
use recsync_protocol::{
    ChangePage, Cursor, PushRequest, Record, RecordId, RecordOutcome, VersionTag,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A client for the remote record store.
///
/// Every call returns only once its whole result is known, whatever the
/// client does internally; the engine relies on this to keep phases
/// strictly ordered. Transport-level retry and backoff belong to the
/// implementation.
pub trait RemoteStoreClient: Send + Sync {
    /// Upserts and deletes records in one batched request.
    ///
    /// Returns one outcome per item.
    fn push(&self, upserts: &[Record], deletes: &[RecordId]) -> RemoteResult<Vec<RecordOutcome>>;

    /// Fetches the next page of changes after `since`.
    fn fetch_changes(&self, since: &Cursor) -> RemoteResult<ChangePage>;

    /// Reads the current server version of each record.
    ///
    /// IDs that no longer exist on the server are omitted.
    fn fetch_current(&self, ids: &[RecordId]) -> RemoteResult<Vec<Record>>;
}

/// A call observed by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// A push request.
    Push(PushRequest),
    /// A change fetch from the given cursor.
    FetchChanges(Cursor),
    /// A current-record read.
    FetchCurrent(Vec<RecordId>),
}

/// A scripted remote store for testing.
///
/// Queued responses are consumed in order. With nothing queued, pushes
/// accept every item with a fresh tag and change fetches return an empty
/// final page at the requested cursor.
#[derive(Debug)]
pub struct MockRemote {
    connected: AtomicBool,
    push_responses: Mutex<VecDeque<RemoteResult<Vec<RecordOutcome>>>>,
    pages: Mutex<VecDeque<RemoteResult<ChangePage>>>,
    current: Mutex<HashMap<RecordId, Record>>,
    calls: Mutex<Vec<RemoteCall>>,
    next_tag: AtomicU64,
}

impl MockRemote {
    /// Creates a new mock remote.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            push_responses: Mutex::new(VecDeque::new()),
            pages: Mutex::new(VecDeque::new()),
            current: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_tag: AtomicU64::new(1),
        }
    }

    /// Queues the result of the next push.
    pub fn push_response(&self, response: RemoteResult<Vec<RecordOutcome>>) {
        self.push_responses.lock().push_back(response);
    }

    /// Queues the result of the next change fetch.
    pub fn page(&self, page: RemoteResult<ChangePage>) {
        self.pages.lock().push_back(page);
    }

    /// Sets the record returned by `fetch_current` for its ID.
    pub fn set_current(&self, record: Record) {
        self.current.lock().insert(record.id.clone(), record);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Returns the push requests made so far.
    pub fn push_calls(&self) -> Vec<PushRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Push(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the ID lists passed to `fetch_current` so far.
    pub fn fetch_current_calls(&self) -> Vec<Vec<RecordId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RemoteCall::FetchCurrent(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the cursors passed to `fetch_changes` so far.
    pub fn fetch_changes_calls(&self) -> Vec<Cursor> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RemoteCall::FetchChanges(cursor) => Some(cursor.clone()),
                _ => None,
            })
            .collect()
    }

    fn check_connected(&self) -> RemoteResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::NotConnected)
        }
    }

    fn accept_all(&self, upserts: &[Record], deletes: &[RecordId]) -> Vec<RecordOutcome> {
        let upserted = upserts.iter().map(|record| {
            let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
            RecordOutcome::accepted(record.id.clone(), Some(VersionTag::new(format!("mock-{}", tag))))
        });
        let deleted = deletes
            .iter()
            .map(|id| RecordOutcome::accepted(id.clone(), None));
        upserted.chain(deleted).collect()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStoreClient for MockRemote {
    fn push(&self, upserts: &[Record], deletes: &[RecordId]) -> RemoteResult<Vec<RecordOutcome>> {
        self.check_connected()?;
        self.calls.lock().push(RemoteCall::Push(PushRequest::new(
            upserts.to_vec(),
            deletes.to_vec(),
        )));

        let queued = self.push_responses.lock().pop_front();
        match queued {
            Some(response) => response,
            None => Ok(self.accept_all(upserts, deletes)),
        }
    }

    fn fetch_changes(&self, since: &Cursor) -> RemoteResult<ChangePage> {
        self.check_connected()?;
        self.calls
            .lock()
            .push(RemoteCall::FetchChanges(since.clone()));

        let queued = self.pages.lock().pop_front();
        match queued {
            Some(page) => page,
            None => Ok(ChangePage::empty(since.clone())),
        }
    }

    fn fetch_current(&self, ids: &[RecordId]) -> RemoteResult<Vec<Record>> {
        self.check_connected()?;
        self.calls.lock().push(RemoteCall::FetchCurrent(ids.to_vec()));

        let current = self.current.lock();
        Ok(ids.iter().filter_map(|id| current.get(id).cloned()).collect())
    }
}
