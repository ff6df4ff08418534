//! HTTP transport for the remote store.
//!
//! The HTTP library itself sits behind [`HttpClient`], so any client
//! (reqwest, hyper, ureq) or a loopback into an in-process server can carry
//! the CBOR-encoded messages.
//!
//! Endpoints:
//!
//! | Path             | Request               | Response               |
//! |------------------|-----------------------|------------------------|
//! | `/sync/push`     | [`PushRequest`]       | [`PushResponse`]       |
//! | `/sync/changes`  | [`FetchChangesRequest`] | [`ChangePage`]       |
//! | `/sync/current`  | [`FetchCurrentRequest`] | [`FetchCurrentResponse`] |

use crate::error::{RemoteError, RemoteResult};
use crate::transport::RemoteStoreClient;
use parking_lot::RwLock;
use recsync_protocol::{
    ChangePage, CodecResult, Cursor, FetchChangesRequest, FetchCurrentRequest,
    FetchCurrentResponse, PushRequest, PushResponse, Record, RecordId, RecordOutcome,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Push endpoint.
pub const PUSH_PATH: &str = "/sync/push";
/// Change feed endpoint.
pub const CHANGES_PATH: &str = "/sync/changes";
/// Current-record endpoint.
pub const CURRENT_PATH: &str = "/sync/current";

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is healthy.
    fn is_healthy(&self) -> bool;
}

/// A message carried as a CBOR body.
pub trait CborMessage: Sized {
    /// Encodes the message.
    fn encode_cbor(&self) -> CodecResult<Vec<u8>>;

    /// Decodes the message.
    fn decode_cbor(bytes: &[u8]) -> CodecResult<Self>;
}

macro_rules! cbor_message {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CborMessage for $ty {
                fn encode_cbor(&self) -> CodecResult<Vec<u8>> {
                    self.encode()
                }

                fn decode_cbor(bytes: &[u8]) -> CodecResult<Self> {
                    Self::decode(bytes)
                }
            }
        )*
    };
}

cbor_message!(
    PushRequest,
    PushResponse,
    FetchChangesRequest,
    ChangePage,
    FetchCurrentRequest,
    FetchCurrentResponse,
);

/// Remote store client speaking CBOR over HTTP.
pub struct HttpRemote<C: HttpClient> {
    /// Base URL of the server (e.g., "https://sync.example.com").
    base_url: String,
    client: C,
    open: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a new HTTP remote.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            open: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the message of the last failed request, cleared by the next
    /// successful one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true if requests can be sent.
    pub fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Stops sending requests until [`reopen`](Self::reopen) is called.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Re-enables sending requests.
    pub fn reopen(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    fn post_cbor<Req, Res>(&self, endpoint: &str, request: &Req) -> RemoteResult<Res>
    where
        Req: CborMessage,
        Res: CborMessage,
    {
        if !self.is_connected() {
            return Err(RemoteError::NotConnected);
        }

        let body = request.encode_cbor()?;
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, bytes = body.len(), "posting request");

        let response = self.client.post(&url, body).map_err(|e| {
            warn!(%url, error = %e, "request failed");
            *self.last_error.write() = Some(e.clone());
            RemoteError::transport_retryable(e)
        })?;

        *self.last_error.write() = None;
        Ok(Res::decode_cbor(&response)?)
    }
}

impl<C: HttpClient> RemoteStoreClient for HttpRemote<C> {
    fn push(&self, upserts: &[Record], deletes: &[RecordId]) -> RemoteResult<Vec<RecordOutcome>> {
        let request = PushRequest::new(upserts.to_vec(), deletes.to_vec());
        let response: PushResponse = self.post_cbor(PUSH_PATH, &request)?;
        Ok(response.into_outcomes())
    }

    fn fetch_changes(&self, since: &Cursor) -> RemoteResult<ChangePage> {
        self.post_cbor(CHANGES_PATH, &FetchChangesRequest::new(since.clone()))
    }

    fn fetch_current(&self, ids: &[RecordId]) -> RemoteResult<Vec<Record>> {
        let response: FetchCurrentResponse =
            self.post_cbor(CURRENT_PATH, &FetchCurrentRequest::new(ids.to_vec()))?;
        Ok(response.records)
    }
}

/// A server that answers requests in-process.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// An HTTP client that routes requests directly to a [`LoopbackServer`].
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a loopback client for the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recsync_protocol::{PerRecordOutcome, PushItemStatus, VersionTag};

    #[derive(Default)]
    struct TestClient {
        response: RwLock<Option<Vec<u8>>>,
        urls: RwLock<Vec<String>>,
        unhealthy: AtomicBool,
    }

    impl TestClient {
        fn respond_with(&self, body: Vec<u8>) {
            *self.response.write() = Some(body);
        }
    }

    impl HttpClient for TestClient {
        fn post(&self, url: &str, _body: Vec<u8>) -> Result<Vec<u8>, String> {
            self.urls.write().push(url.to_string());
            self.response
                .read()
                .clone()
                .ok_or_else(|| "connection refused".into())
        }

        fn is_healthy(&self) -> bool {
            !self.unhealthy.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn base_url_is_normalized() {
        let remote = HttpRemote::new("https://sync.example.com/", TestClient::default());
        assert_eq!(remote.base_url(), "https://sync.example.com");
        assert!(remote.is_connected());
    }

    #[test]
    fn closed_remote_refuses_requests() {
        let remote = HttpRemote::new("https://sync.example.com", TestClient::default());
        remote.close();
        assert!(matches!(
            remote.fetch_changes(&Cursor::initial()),
            Err(RemoteError::NotConnected)
        ));
        remote.reopen();
        assert!(remote.is_connected());
    }

    #[test]
    fn unhealthy_client_is_not_connected() {
        let client = TestClient::default();
        client.unhealthy.store(true, Ordering::SeqCst);
        let remote = HttpRemote::new("https://sync.example.com", client);
        assert!(!remote.is_connected());
    }

    #[test]
    fn transport_failure_is_retryable_and_recorded() {
        let remote = HttpRemote::new("https://sync.example.com", TestClient::default());
        let err = remote.fetch_current(&[RecordId::new("a")]).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(remote.last_error().as_deref(), Some("connection refused"));
    }

    #[test]
    fn garbage_response_is_protocol_error() {
        let client = TestClient::default();
        client.respond_with(vec![0xff, 0x00, 0x13]);
        let remote = HttpRemote::new("https://sync.example.com", client);
        let err = remote.fetch_changes(&Cursor::initial()).unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn push_statuses_map_to_outcomes() {
        let client = TestClient::default();
        let response = PushResponse::new(vec![
            PushItemStatus::ok(RecordId::new("a"), Some(VersionTag::new("t2"))),
            PushItemStatus::conflict(RecordId::new("b")),
            PushItemStatus::error(RecordId::new("c"), 500, "disk full"),
        ]);
        client.respond_with(response.encode().unwrap());
        let remote = HttpRemote::new("https://sync.example.com", client);

        let outcomes = remote
            .push(&[Record::new("a", "note"), Record::new("b", "note")], &[RecordId::new("c")])
            .unwrap();

        assert_eq!(
            outcomes[0].outcome,
            PerRecordOutcome::Accepted(Some(VersionTag::new("t2")))
        );
        assert_eq!(outcomes[1].outcome, PerRecordOutcome::Conflicted);
        assert_eq!(
            outcomes[2].outcome,
            PerRecordOutcome::Rejected("disk full".into())
        );
        assert_eq!(
            remote.client().urls.read().as_slice(),
            ["https://sync.example.com/sync/push"]
        );
    }

    #[test]
    fn change_page_decodes() {
        let client = TestClient::default();
        let page = ChangePage::new(
            vec![Record::new("a", "note").with_field("title", "x")],
            Vec::new(),
            Cursor::new("42"),
            true,
        );
        client.respond_with(page.encode().unwrap());
        let remote = HttpRemote::new("https://sync.example.com", client);

        assert_eq!(remote.fetch_changes(&Cursor::initial()).unwrap(), page);
    }

    #[test]
    fn loopback_strips_host() {
        struct Echo;
        impl LoopbackServer for Echo {
            fn handle_post(&self, path: &str, _body: &[u8]) -> Result<Vec<u8>, String> {
                Ok(path.as_bytes().to_vec())
            }
        }

        let client = LoopbackClient::new(Echo);
        let body = client
            .post("http://localhost:8080/sync/changes", Vec::new())
            .unwrap();
        assert_eq!(body, b"/sync/changes");
    }
}
