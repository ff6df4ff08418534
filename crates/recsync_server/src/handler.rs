//! Request handlers for the record endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::RecordStore;
use recsync_protocol::{
    ChangePage, FetchChangesRequest, FetchCurrentRequest, FetchCurrentResponse, PushItemStatus,
    PushRequest, PushResponse,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Handler for record sync requests.
pub struct RequestHandler {
    config: ServerConfig,
    store: Arc<RecordStore>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(config: ServerConfig, store: Arc<RecordStore>) -> Self {
        Self { config, store }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handles a push request.
    ///
    /// Items are applied one by one, upserts first. Each gets its own
    /// status: 200 with the new tag, or 409 when the client's tag is stale.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        if request.len() > self.config.max_push_batch {
            return Err(ServerError::BatchTooLarge {
                size: request.len(),
                max: self.config.max_push_batch,
            });
        }
        if let Some(record) = request.upserts.iter().find(|r| r.id.is_empty()) {
            return Err(ServerError::InvalidRequest(format!(
                "record of type {} has an empty id",
                record.entity_type
            )));
        }

        let mut items = Vec::with_capacity(request.len());
        let mut conflicts = 0usize;

        for record in request.upserts {
            let id = record.id.clone();
            match self.store.upsert(record) {
                Ok(tag) => items.push(PushItemStatus::ok(id, Some(tag))),
                Err(conflict) => {
                    debug!(
                        record = %id,
                        client_tag = ?conflict.client_tag,
                        server_tag = ?conflict.server_tag,
                        "stale push"
                    );
                    conflicts += 1;
                    items.push(PushItemStatus::conflict(id));
                }
            }
        }

        for id in request.deletes {
            self.store.delete(&id);
            items.push(PushItemStatus::ok(id, None));
        }

        info!(items = items.len(), conflicts, "push handled");
        Ok(PushResponse::new(items))
    }

    /// Handles a change feed request.
    pub fn handle_fetch_changes(&self, request: FetchChangesRequest) -> ServerResult<ChangePage> {
        let page = self
            .store
            .changes_since(&request.since, self.config.max_page_size)?;
        debug!(
            since = %request.since,
            changes = page.len(),
            has_more = page.has_more,
            "change page served"
        );
        Ok(page)
    }

    /// Handles a current-record request.
    pub fn handle_fetch_current(
        &self,
        request: FetchCurrentRequest,
    ) -> ServerResult<FetchCurrentResponse> {
        Ok(FetchCurrentResponse::new(self.store.current(&request.ids)))
    }
}
