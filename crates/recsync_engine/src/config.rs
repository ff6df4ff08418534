//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use crate::resolver::ConflictPolicy;

/// Default upper bound on pages fetched in one pull.
pub const DEFAULT_MAX_PULL_PAGES: usize = 10_000;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Label attached to log output, e.g. the replica or zone name.
    pub label: String,
    /// Conflict resolution policy.
    pub conflict_policy: ConflictPolicy,
    /// Maximum pages fetched in one pull before the run fails.
    pub max_pull_pages: usize,
}

impl SyncConfig {
    /// Creates a configuration with the given conflict policy.
    pub fn new(conflict_policy: ConflictPolicy) -> Self {
        Self {
            label: "default".into(),
            conflict_policy,
            max_pull_pages: DEFAULT_MAX_PULL_PAGES,
        }
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the maximum number of pages fetched in one pull.
    pub fn with_max_pull_pages(mut self, pages: usize) -> Self {
        self.max_pull_pages = pages;
        self
    }

    /// Sets the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Checks the configuration before any run starts.
    pub fn validate(&self) -> SyncResult<()> {
        self.conflict_policy.validate()?;
        if self.max_pull_pages == 0 {
            return Err(SyncError::InvalidConfig(
                "max_pull_pages must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(ConflictPolicy::default())
    }
}
