//! Cursor persistence.
//!
//! [FileCursorStore] writes the cursor as JSON to a sibling temp file, fsyncs it and
//! renames it over the target, so a crash leaves either the old or the new cursor on disk.
//! [MemoryCursorStore] keeps it in process (restarts begin from the default again).

use crate::cursor::Cursor;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cursor store I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("decode cursor from {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode cursor for {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cursor store unavailable: {0}")]
    Unavailable(String),
}

/// Durable get/set of the sync cursor. Only the sync driver writes to it.
pub trait CursorStore {
    /// Last persisted cursor, `None` if nothing has been persisted yet.
    fn load_cursor(&self) -> Result<Option<Cursor>, StoreError>;

    /// Last persisted cursor, or `default` if nothing has been persisted yet.
    fn get_cursor(&self, default: Cursor) -> Result<Cursor, StoreError> {
        Ok(self.load_cursor()?.unwrap_or(default))
    }

    /// Persist `cursor`. Must be atomic with respect to a process crash.
    fn set_cursor(&mut self, cursor: Cursor) -> Result<(), StoreError>;
}

impl<S: CursorStore + ?Sized> CursorStore for Box<S> {
    fn load_cursor(&self) -> Result<Option<Cursor>, StoreError> {
        (**self).load_cursor()
    }

    fn set_cursor(&mut self, cursor: Cursor) -> Result<(), StoreError> {
        (**self).set_cursor(cursor)
    }
}

/// In-memory store. Clones share the same cell.
#[derive(Debug, Clone, Default)]
pub struct MemoryCursorStore {
    cell: Arc<Mutex<Option<Cursor>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `cursor`, as if a previous run had persisted it.
    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Some(cursor))),
        }
    }

    /// Currently persisted cursor, if any.
    pub fn current(&self) -> Option<Cursor> {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CursorStore for MemoryCursorStore {
    fn load_cursor(&self) -> Result<Option<Cursor>, StoreError> {
        Ok(self.current())
    }

    fn set_cursor(&mut self, cursor: Cursor) -> Result<(), StoreError> {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner()) = Some(cursor);
        Ok(())
    }
}

/// JSON file store: `{"block_height": N, "transaction_index": null}`.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CursorStore for FileCursorStore {
    fn load_cursor(&self) -> Result<Option<Cursor>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no cursor file");
                return Ok(None);
            }
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                path: self.path.clone(),
                source,
            })
    }

    fn set_cursor(&mut self, cursor: Cursor) -> Result<(), StoreError> {
        let body = serde_json::to_vec(&cursor).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;
        let mut file = File::create(&self.tmp_path).map_err(|e| self.io_err(e))?;
        file.write_all(&body).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        drop(file);
        fs::rename(&self.tmp_path, &self.path).map_err(|e| self.io_err(e))?;
        // Persist the rename itself; not every platform can open a directory for sync.
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }
        tracing::trace!(%cursor, path = %self.path.display(), "cursor persisted");
        Ok(())
    }
}
