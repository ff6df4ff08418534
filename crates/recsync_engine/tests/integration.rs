//! Integration tests for the sync engine against the reference server.

use proptest::prelude::*;
use recsync_engine::{
    ChangeTracker, ConflictPolicy, CursorStore, FileCursorStore, HttpRemote, LoopbackClient,
    LoopbackServer, MemoryChangeTracker, MemoryCursorStore, MemoryLocalStore, MockRemote,
    RemoteResult, RemoteStoreClient, SyncConfig, SyncEngine, SyncError,
};
use recsync_protocol::{
    ChangePage, Cursor, FetchChangesRequest, FetchCurrentRequest, PushRequest, Record, RecordId,
    RecordOutcome, RecordRef,
};
use recsync_server::{RecordServer, ServerConfig};
use std::sync::Arc;

/// Routes loopback HTTP requests into a shared server.
struct SharedServer(Arc<RecordServer>);

impl LoopbackServer for SharedServer {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.0.handle_post(path, body)
    }
}

/// Calls the server handlers directly, skipping the codec.
struct InMemoryRemote {
    server: Arc<RecordServer>,
}

impl RemoteStoreClient for InMemoryRemote {
    fn push(&self, upserts: &[Record], deletes: &[RecordId]) -> RemoteResult<Vec<RecordOutcome>> {
        self.server
            .handle_push(PushRequest::new(upserts.to_vec(), deletes.to_vec()))
            .map(|response| response.into_outcomes())
            .map_err(|e| recsync_engine::RemoteError::Server(e.to_string()))
    }

    fn fetch_changes(&self, since: &Cursor) -> RemoteResult<ChangePage> {
        self.server
            .handle_fetch_changes(FetchChangesRequest::new(since.clone()))
            .map_err(|e| recsync_engine::RemoteError::Server(e.to_string()))
    }

    fn fetch_current(&self, ids: &[RecordId]) -> RemoteResult<Vec<Record>> {
        self.server
            .handle_fetch_current(FetchCurrentRequest::new(ids.to_vec()))
            .map(|response| response.records)
            .map_err(|e| recsync_engine::RemoteError::Server(e.to_string()))
    }
}

type HttpClientEngine = SyncEngine<
    MemoryChangeTracker,
    MemoryCursorStore,
    HttpRemote<LoopbackClient<SharedServer>>,
    MemoryLocalStore,
>;

fn server(page_size: usize) -> Arc<RecordServer> {
    Arc::new(RecordServer::new(
        ServerConfig::default().with_max_page_size(page_size),
    ))
}

fn http_client(server: &Arc<RecordServer>, policy: ConflictPolicy) -> HttpClientEngine {
    let remote = HttpRemote::new(
        "http://sync.local",
        LoopbackClient::new(SharedServer(Arc::clone(server))),
    );
    SyncEngine::new(
        SyncConfig::new(policy),
        MemoryChangeTracker::new(),
        MemoryCursorStore::new(),
        remote,
        MemoryLocalStore::new(),
    )
    .unwrap()
}

fn note(id: &str, title: &str) -> Record {
    Record::new(id, "note").with_field("title", title)
}

fn title(engine: &HttpClientEngine, id: &str) -> Option<serde_json::Value> {
    engine
        .local_store()
        .get(&RecordRef::new(id, "note"))
        .and_then(|r| r.field("title").cloned())
}

/// Edits the local copy of a record and records the mutation.
fn edit(engine: &HttpClientEngine, id: &str, new_title: &str) {
    let mut record = engine
        .local_store()
        .get(&RecordRef::new(id, "note"))
        .unwrap();
    record.fields.insert("title".into(), serde_json::json!(new_title));
    engine.tracker().record_upsert(record);
}

#[test]
fn two_clients_converge_across_pages() {
    let server = server(2);
    let alice = http_client(&server, ConflictPolicy::ServerWins);
    let bob = http_client(&server, ConflictPolicy::ServerWins);

    for i in 0..5 {
        alice
            .tracker()
            .record_upsert(note(&format!("n{}", i), "from alice"));
    }
    let report = alice.run().unwrap();
    assert_eq!(report.pushed_upserts, 5);
    assert_eq!(alice.tracker().pending_count(), 0);

    let report = bob.run().unwrap();
    assert_eq!(report.pages_pulled, 3);
    assert_eq!(report.pulled_upserts, 5);
    assert_eq!(bob.local_store().len(), 5);
    assert_eq!(
        bob.cursor_store().current().unwrap(),
        Cursor::new(server.sequence().to_string())
    );

    let again = bob.run().unwrap();
    assert_eq!(again.pulled_upserts, 0);
    assert_eq!(bob.cursor_store().commit_count(), 2);
}

#[test]
fn server_wins_discards_stale_local_edit() {
    let server = server(100);
    let alice = http_client(&server, ConflictPolicy::ServerWins);
    let bob = http_client(&server, ConflictPolicy::ServerWins);

    alice.tracker().record_upsert(note("shared", "v0"));
    alice.run().unwrap();
    bob.run().unwrap();

    edit(&alice, "shared", "alice");
    alice.run().unwrap();
    edit(&bob, "shared", "bob");

    let report = bob.run().unwrap();

    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(title(&bob, "shared"), Some(serde_json::json!("alice")));
    let stored = server.store().get(&RecordId::new("shared")).unwrap();
    assert_eq!(stored.field("title"), Some(&serde_json::json!("alice")));
    assert_eq!(
        bob.local_store()
            .get(&RecordRef::new("shared", "note"))
            .unwrap()
            .version_tag,
        stored.version_tag
    );
}

#[test]
fn client_wins_overwrites_server() {
    let server = server(100);
    let alice = http_client(&server, ConflictPolicy::ServerWins);
    let bob = http_client(&server, ConflictPolicy::ClientWins);

    alice.tracker().record_upsert(note("shared", "v0"));
    alice.run().unwrap();
    bob.run().unwrap();

    edit(&alice, "shared", "alice");
    alice.run().unwrap();
    edit(&bob, "shared", "bob");
    bob.run().unwrap();

    assert_eq!(title(&bob, "shared"), Some(serde_json::json!("bob")));
    let stored = server.store().get(&RecordId::new("shared")).unwrap();
    assert_eq!(stored.field("title"), Some(&serde_json::json!("bob")));

    alice.run().unwrap();
    assert_eq!(title(&alice, "shared"), Some(serde_json::json!("bob")));
}

#[test]
fn custom_resolution_merges_fields() {
    let server = server(100);
    let alice = http_client(&server, ConflictPolicy::ServerWins);
    let merge = ConflictPolicy::client_tells_which_wins(|client, server| {
        let mut merged = server.clone();
        for (name, value) in &client.fields {
            merged.fields.entry(name.clone()).or_insert_with(|| value.clone());
        }
        merged
    });
    let bob = http_client(&server, merge);

    alice.tracker().record_upsert(note("shared", "v0"));
    alice.run().unwrap();
    bob.run().unwrap();

    edit(&alice, "shared", "alice");
    alice.run().unwrap();

    let mut local = bob
        .local_store()
        .get(&RecordRef::new("shared", "note"))
        .unwrap();
    local.fields.insert("tag".into(), serde_json::json!("urgent"));
    bob.tracker().record_upsert(local);
    bob.run().unwrap();

    let stored = server.store().get(&RecordId::new("shared")).unwrap();
    assert_eq!(stored.field("title"), Some(&serde_json::json!("alice")));
    assert_eq!(stored.field("tag"), Some(&serde_json::json!("urgent")));
}

#[test]
fn deletions_propagate() {
    let server = server(100);
    let alice = http_client(&server, ConflictPolicy::ServerWins);
    let bob = http_client(&server, ConflictPolicy::ServerWins);

    alice.tracker().record_upsert(note("doomed", "x"));
    alice.tracker().record_upsert(note("kept", "y"));
    alice.run().unwrap();
    bob.run().unwrap();
    assert_eq!(bob.local_store().len(), 2);

    alice.tracker().record_delete(RecordRef::new("doomed", "note"));
    let report = alice.run().unwrap();
    assert_eq!(report.pushed_deletes, 1);

    let report = bob.run().unwrap();
    assert_eq!(report.pulled_deletes, 1);
    assert_eq!(title(&bob, "doomed"), None);
    assert_eq!(title(&bob, "kept"), Some(serde_json::json!("y")));
}

#[test]
fn rejected_push_surfaces_server_error() {
    let server = Arc::new(RecordServer::new(
        ServerConfig::default().with_max_push_batch(1),
    ));
    let alice = http_client(&server, ConflictPolicy::ServerWins);
    alice.tracker().record_upsert(note("a", "1"));
    alice.tracker().record_upsert(note("b", "2"));

    let err = alice.run().unwrap_err();

    assert!(matches!(err, SyncError::Push(_)));
    assert!(err.to_string().contains("413"));
    assert_eq!(alice.tracker().pending_count(), 2);
    assert!(server.store().is_empty());
}

#[test]
fn file_cursor_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cursor.cbor");
    let server = server(100);
    let seed = InMemoryRemote {
        server: Arc::clone(&server),
    };
    seed.push(&[note("a", "1"), note("b", "2")], &[]).unwrap();

    let first = SyncEngine::new(
        SyncConfig::default(),
        MemoryChangeTracker::new(),
        FileCursorStore::open(&path).unwrap(),
        InMemoryRemote {
            server: Arc::clone(&server),
        },
        MemoryLocalStore::new(),
    )
    .unwrap();
    assert_eq!(first.run().unwrap().pulled_upserts, 2);
    drop(first);

    seed.push(&[note("c", "3")], &[]).unwrap();

    let second = SyncEngine::new(
        SyncConfig::default(),
        MemoryChangeTracker::new(),
        FileCursorStore::open(&path).unwrap(),
        InMemoryRemote {
            server: Arc::clone(&server),
        },
        MemoryLocalStore::new(),
    )
    .unwrap();
    assert_eq!(second.cursor_store().current().unwrap(), Cursor::new("2"));

    let report = second.run().unwrap();
    assert_eq!(report.pulled_upserts, 1);
    assert_eq!(second.local_store().records()[0].id, RecordId::new("c"));
}

#[test]
fn mutation_during_run_survives_clear() {
    let server = server(100);
    let alice = http_client(&server, ConflictPolicy::ServerWins);
    alice.tracker().record_upsert(note("a", "first"));

    let snapshot = alice.tracker().snapshot().unwrap();
    alice.run().unwrap();
    alice.tracker().record_upsert(note("b", "later"));
    alice.tracker().clear(&snapshot).unwrap();

    assert!(alice.tracker().is_pending(&RecordId::new("b")));
}

fn page_strategy() -> impl Strategy<Value = Vec<ChangePage>> {
    let record = ("[a-f]", 0u32..100).prop_map(|(id, n)| Record::new(id, "note").with_field("n", n));
    let page = (
        proptest::collection::vec(record, 0..5),
        proptest::collection::vec("[a-f]", 0..2),
    );
    proptest::collection::vec(page, 1..4).prop_map(|pages| {
        let count = pages.len();
        pages
            .into_iter()
            .enumerate()
            .map(|(i, (upserted, deleted))| {
                ChangePage::new(
                    upserted,
                    deleted.into_iter().map(|id| RecordRef::new(id, "note")).collect(),
                    Cursor::new(format!("c{}", i + 1)),
                    i + 1 < count,
                )
            })
            .collect()
    })
}

fn mock_engine(
    pages: &[ChangePage],
) -> SyncEngine<MemoryChangeTracker, MemoryCursorStore, MockRemote, MemoryLocalStore> {
    let remote = MockRemote::new();
    for page in pages {
        remote.page(Ok(page.clone()));
    }
    SyncEngine::new(
        SyncConfig::default(),
        MemoryChangeTracker::new(),
        MemoryCursorStore::new(),
        remote,
        MemoryLocalStore::new(),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rerun_after_apply_failure_matches_clean_run(
        pages in page_strategy(),
        failing in "[a-f]",
    ) {
        let clean = mock_engine(&pages);
        clean.run().unwrap();

        let retried = mock_engine(&pages);
        retried.local_store().set_fail_on(failing.as_str());
        let first = retried.run();
        retried.local_store().clear_failures();
        if first.is_err() {
            prop_assert_eq!(retried.cursor_store().current().unwrap(), Cursor::initial());
            for page in &pages {
                retried.remote().page(Ok(page.clone()));
            }
            retried.run().unwrap();
        }

        prop_assert_eq!(retried.local_store().records(), clean.local_store().records());
        prop_assert_eq!(
            retried.cursor_store().current().unwrap(),
            clean.cursor_store().current().unwrap()
        );
    }
}
