//! End-to-end tests of the record server over its CBOR endpoints.

use recsync_protocol::{
    ChangePage, Cursor, FetchChangesRequest, FetchCurrentRequest, FetchCurrentResponse,
    PushItemStatus, PushRequest, PushResponse, Record, RecordId, RecordRef,
};
use recsync_server::{RecordServer, ServerConfig};

fn push(server: &RecordServer, upserts: Vec<Record>, deletes: Vec<RecordId>) -> PushResponse {
    let body = PushRequest::new(upserts, deletes).encode().unwrap();
    PushResponse::decode(&server.handle_post("/sync/push", &body).unwrap()).unwrap()
}

fn changes(server: &RecordServer, since: Cursor) -> ChangePage {
    let body = FetchChangesRequest::new(since).encode().unwrap();
    ChangePage::decode(&server.handle_post("/sync/changes", &body).unwrap()).unwrap()
}

fn drain(server: &RecordServer, mut cursor: Cursor) -> (Vec<Record>, Vec<RecordRef>, Cursor) {
    let mut upserted = Vec::new();
    let mut deleted = Vec::new();
    loop {
        let page = changes(server, cursor);
        upserted.extend(page.upserted);
        deleted.extend(page.deleted);
        cursor = page.next_cursor;
        if !page.has_more {
            return (upserted, deleted, cursor);
        }
    }
}

#[test]
fn optimistic_concurrency_round() {
    let server = RecordServer::new(ServerConfig::default());

    let first = push(&server, vec![Record::new("a", "note").with_field("n", 1)], vec![]);
    let tag = first.items[0].version_tag.clone().unwrap();

    let stale = push(&server, vec![Record::new("a", "note").with_field("n", 2)], vec![]);
    assert_eq!(stale.items[0].status, PushItemStatus::CONFLICT);

    let body = FetchCurrentRequest::new(vec![RecordId::new("a")]).encode().unwrap();
    let current = FetchCurrentResponse::decode(&server.handle_post("/sync/current", &body).unwrap())
        .unwrap()
        .records;
    assert_eq!(current[0].version_tag.as_ref(), Some(&tag));

    let retry = push(
        &server,
        vec![Record::new("a", "note").with_field("n", 2).with_version_tag(tag)],
        vec![],
    );
    assert_eq!(retry.items[0].status, PushItemStatus::OK);
    assert_eq!(
        server.store().get(&RecordId::new("a")).unwrap().field("n"),
        Some(&serde_json::json!(2))
    );
}

#[test]
fn feed_drains_across_pages_and_resumes() {
    let server = RecordServer::new(ServerConfig::default().with_max_page_size(3));
    let records = (0..7).map(|i| Record::new(format!("r{}", i), "note")).collect();
    push(&server, records, vec![]);

    let (upserted, deleted, cursor) = drain(&server, Cursor::initial());
    assert_eq!(upserted.len(), 7);
    assert!(deleted.is_empty());

    push(&server, vec![], vec![RecordId::new("r3"), RecordId::new("missing")]);

    let (upserted, deleted, _) = drain(&server, cursor);
    assert!(upserted.is_empty());
    assert_eq!(deleted, vec![RecordRef::new("r3", "note")]);
}

#[test]
fn invalid_cursor_is_a_client_error() {
    let server = RecordServer::new(ServerConfig::default());
    let body = FetchChangesRequest::new(Cursor::new("not-a-number"))
        .encode()
        .unwrap();
    let err = server.handle_post("/sync/changes", &body).unwrap_err();
    assert!(err.starts_with("400"));
}
