//! Cursor persistence.
//!
//! A cursor store holds the position of the last remote change fully
//! applied locally. Updates are two-step: `stage` a new cursor, then
//! `commit` it. Staged values are invisible to `current` until committed,
//! so a crash mid-run leaves the previous cursor in place.

use crate::error::{StoreError, StoreResult};
use parking_lot::{Mutex, RwLock};
use recsync_protocol::Cursor;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable holder of the committed cursor.
pub trait CursorStore: Send + Sync {
    /// Returns the last committed cursor.
    fn current(&self) -> StoreResult<Cursor>;

    /// Stages a cursor for the next commit, replacing any staged value.
    fn stage(&self, cursor: Cursor);

    /// Makes the staged cursor durable and visible to `current`.
    ///
    /// Committing with nothing staged is a no-op.
    fn commit(&self) -> StoreResult<()>;
}

/// An in-memory cursor store.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    committed: RwLock<Cursor>,
    staged: Mutex<Option<Cursor>>,
    commits: RwLock<u64>,
}

impl MemoryCursorStore {
    /// Creates a store positioned at the start of the stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with an already committed cursor.
    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            committed: RwLock::new(cursor),
            ..Self::default()
        }
    }

    /// Returns the staged, not yet committed cursor.
    pub fn staged(&self) -> Option<Cursor> {
        self.staged.lock().clone()
    }

    /// Returns how many commits changed the cursor.
    pub fn commit_count(&self) -> u64 {
        *self.commits.read()
    }
}

impl CursorStore for MemoryCursorStore {
    fn current(&self) -> StoreResult<Cursor> {
        Ok(self.committed.read().clone())
    }

    fn stage(&self, cursor: Cursor) {
        *self.staged.lock() = Some(cursor);
    }

    fn commit(&self) -> StoreResult<()> {
        if let Some(cursor) = self.staged.lock().take() {
            *self.committed.write() = cursor;
            *self.commits.write() += 1;
        }
        Ok(())
    }
}

const CURSOR_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCursor {
    version: u16,
    cursor: Cursor,
}

/// A cursor store backed by a single CBOR file.
///
/// Commits use the write-then-rename pattern:
/// 1. Write to a temporary file next to the target
/// 2. Sync the temporary file to disk
/// 3. Rename it over the target
/// 4. Fsync the directory so the rename is durable
pub struct FileCursorStore {
    path: PathBuf,
    committed: RwLock<Cursor>,
    staged: Mutex<Option<Cursor>>,
}

impl FileCursorStore {
    /// Opens the store, loading the committed cursor if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let committed = if path.exists() {
            Self::load(&path)?
        } else {
            Cursor::initial()
        };

        Ok(Self {
            path,
            committed: RwLock::new(committed),
            staged: Mutex::new(None),
        })
    }

    /// Returns the cursor file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> StoreResult<Cursor> {
        let bytes = fs::read(path)?;
        let persisted: PersistedCursor = ciborium::from_reader(bytes.as_slice())
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        if persisted.version != CURSOR_FORMAT_VERSION {
            return Err(StoreError::Codec(format!(
                "unsupported cursor file version {}",
                persisted.version
            )));
        }

        Ok(persisted.cursor)
    }

    fn save(&self, cursor: &Cursor) -> StoreResult<()> {
        let persisted = PersistedCursor {
            version: CURSOR_FORMAT_VERSION,
            cursor: cursor.clone(),
        };
        let mut data = Vec::new();
        ciborium::into_writer(&persisted, &mut data)
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StoreResult<()> {
        // NTFS journals the rename; directory fsync is not available.
        Ok(())
    }
}

impl CursorStore for FileCursorStore {
    fn current(&self) -> StoreResult<Cursor> {
        Ok(self.committed.read().clone())
    }

    fn stage(&self, cursor: Cursor) {
        *self.staged.lock() = Some(cursor);
    }

    fn commit(&self) -> StoreResult<()> {
        let mut staged = self.staged.lock();
        if let Some(cursor) = staged.as_ref() {
            self.save(cursor)?;
            *self.committed.write() = cursor.clone();
            *staged = None;
        }
        Ok(())
    }
}
