//! Conflict resolution policies.

use crate::error::{SyncError, SyncResult};
use recsync_protocol::{ConflictEntry, ConflictSet, Record, RecordId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A caller-supplied resolution function: `(client, server) -> kept`.
pub type ResolveFn = Arc<dyn Fn(&Record, &Record) -> Record + Send + Sync>;

/// Policy for resolving a record the server reports as conflicted.
///
/// Configured once per engine and immutable for the engine's lifetime.
#[derive(Clone)]
pub enum ConflictPolicy {
    /// Delegate to a caller-supplied function.
    ClientTellsWhichWins(ResolveFn),
    /// Keep the server version; the client's write is discarded.
    ServerWins,
    /// Keep the client's fields on top of the server's version tag.
    ClientWins,
    /// Keep both versions. No merge rule is defined, so engines refuse
    /// this policy at configuration time.
    KeepBoth,
}

impl ConflictPolicy {
    /// Creates a policy delegating to `resolve`.
    pub fn client_tells_which_wins<F>(resolve: F) -> Self
    where
        F: Fn(&Record, &Record) -> Record + Send + Sync + 'static,
    {
        ConflictPolicy::ClientTellsWhichWins(Arc::new(resolve))
    }

    /// Returns the policy name.
    pub fn name(&self) -> &'static str {
        match self {
            ConflictPolicy::ClientTellsWhichWins(_) => "ClientTellsWhichWins",
            ConflictPolicy::ServerWins => "ServerWins",
            ConflictPolicy::ClientWins => "ClientWins",
            ConflictPolicy::KeepBoth => "KeepBoth",
        }
    }

    /// Fails with `UnsupportedPolicy` for policies that cannot resolve.
    pub fn validate(&self) -> SyncResult<()> {
        match self {
            ConflictPolicy::KeepBoth => Err(SyncError::UnsupportedPolicy(
                "KeepBoth has no field merge rule".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Produces the record to persist for a conflicted pair.
    pub fn resolve(&self, entry: ConflictEntry) -> SyncResult<Record> {
        let ConflictEntry { client, server } = entry;

        match self {
            ConflictPolicy::ServerWins => Ok(server),
            ConflictPolicy::ClientWins => Ok(Record {
                fields: client.fields,
                ..server
            }),
            ConflictPolicy::ClientTellsWhichWins(resolve) => {
                let kept = resolve(&client, &server);
                if kept.id.is_empty() || kept.id != client.id {
                    return Err(SyncError::InvalidResolution {
                        expected: client.id,
                        actual: kept.id,
                    });
                }
                Ok(kept)
            }
            ConflictPolicy::KeepBoth => Err(SyncError::UnsupportedPolicy(
                "KeepBoth has no field merge rule".into(),
            )),
        }
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::ServerWins
    }
}

impl fmt::Debug for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves every conflict of a push round under one policy.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    /// Creates a resolver for `policy`.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Resolves one pair.
    pub fn resolve(&self, entry: ConflictEntry) -> SyncResult<Record> {
        self.policy.resolve(entry)
    }

    /// Resolves every pair, keyed by record ID.
    pub fn resolve_all(&self, conflicts: ConflictSet) -> SyncResult<BTreeMap<RecordId, Record>> {
        conflicts
            .into_iter()
            .map(|entry| {
                let id = entry.id().clone();
                self.resolve(entry).map(|record| (id, record))
            })
            .collect()
    }
}
