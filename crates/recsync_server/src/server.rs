//! Main record server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::store::RecordStore;
use recsync_protocol::{
    ChangePage, FetchChangesRequest, FetchCurrentRequest, FetchCurrentResponse, PushRequest,
    PushResponse,
};
use std::sync::Arc;
use tracing::warn;

/// The record server.
///
/// Serves the push, change feed and current-record endpoints over a
/// shared [`RecordStore`].
///
/// # Example
///
/// ```
/// use recsync_server::{RecordServer, ServerConfig};
///
/// let server = RecordServer::new(ServerConfig::default());
///
/// // An HTTP front end would route POST bodies to server.handle_post()
/// assert_eq!(server.sequence(), 0);
/// ```
pub struct RecordServer {
    handler: RequestHandler,
    store: Arc<RecordStore>,
}

impl RecordServer {
    /// Creates a new server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(RecordStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<RecordStore>) -> Self {
        let handler = RequestHandler::new(config, Arc::clone(&store));
        Self { handler, store }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Returns the last assigned sequence number.
    pub fn sequence(&self) -> u64 {
        self.store.sequence()
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(request)
    }

    /// Handles a change feed request.
    pub fn handle_fetch_changes(&self, request: FetchChangesRequest) -> ServerResult<ChangePage> {
        self.handler.handle_fetch_changes(request)
    }

    /// Handles a current-record request.
    pub fn handle_fetch_current(
        &self,
        request: FetchCurrentRequest,
    ) -> ServerResult<FetchCurrentResponse> {
        self.handler.handle_fetch_current(request)
    }

    /// Dispatches a CBOR-encoded POST body by path.
    pub fn dispatch(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let response = match path {
            "/sync/push" => self.handle_push(PushRequest::decode(body)?)?.encode()?,
            "/sync/changes" => self
                .handle_fetch_changes(FetchChangesRequest::decode(body)?)?
                .encode()?,
            "/sync/current" => self
                .handle_fetch_current(FetchCurrentRequest::decode(body)?)?
                .encode()?,
            other => return Err(ServerError::UnknownEndpoint(other.to_string())),
        };
        Ok(response)
    }

    /// Handles a POST request, rendering failures as `"<status>: <message>"`.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.dispatch(path, body).map_err(|e| {
            warn!(path, status = e.status(), error = %e, "request failed");
            format!("{}: {}", e.status(), e)
        })
    }
}
