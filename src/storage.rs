//! File-backed record store.
//!
//! The whole library lives in one JSON document:
//!
//! ```text
//! <library dir>/
//!   .shelf.toml           # configuration (see `config`)
//!   library.json          # LibrarySnapshot: books, stages, tasks
//!   library.json.lock     # held while a batch is planned and applied
//! ```
//!
//! Each `apply` takes the lock, re-reads the file, applies the batch to the
//! in-memory snapshot and renames a fresh file into place. A batch that fails
//! validation never reaches disk. Between `begin_exclusive` and
//! `end_exclusive` the store keeps the lock, so the reads a batch was planned
//! from cannot go stale before it is applied.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::model::{Book, Level, Stage, Task};
use crate::store::{LibrarySnapshot, RecordStore, WriteBatch};

/// Default library file name inside the library directory
pub const LIBRARY_FILE: &str = "library.json";

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_timeout_ms: u64,
    held: Option<FileLock>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        Self {
            path: path.into(),
            lock_timeout_ms,
            held: None,
        }
    }

    /// Store at `<dir>/library.json` with the default lock timeout.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(LIBRARY_FILE), DEFAULT_LOCK_TIMEOUT_MS)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty library file if none exists. Returns whether one was
    /// written.
    pub fn init(&self) -> Result<bool> {
        let _lock = self.acquire()?;
        if self.path.exists() {
            return Ok(false);
        }
        write_json(&self.path, &LibrarySnapshot::empty())?;
        Ok(true)
    }

    /// Read the current snapshot; a missing file is an empty library.
    pub fn load(&self) -> Result<LibrarySnapshot> {
        if !self.path.exists() {
            return Ok(LibrarySnapshot::empty());
        }
        let snapshot: LibrarySnapshot = read_json(&self.path)?;
        snapshot.validate()?;
        debug!(
            path = %self.path.display(),
            books = snapshot.books.len(),
            stages = snapshot.stages.len(),
            tasks = snapshot.tasks.len(),
            "loaded library"
        );
        Ok(snapshot)
    }

    fn read(&self) -> Result<LibrarySnapshot> {
        self.load().map_err(Error::into_storage_failure)
    }

    fn acquire(&self) -> Result<FileLock> {
        FileLock::acquire(lock::lock_path_for(&self.path), self.lock_timeout_ms)
    }

    fn commit(&self, batch: &WriteBatch) -> Result<()> {
        let _lock = match self.held {
            Some(_) => None,
            None => Some(self.acquire()?),
        };
        let mut snapshot = self.load()?;
        snapshot.apply(batch)?;
        write_json(&self.path, &snapshot)?;
        debug!(path = %self.path.display(), writes = batch.len(), "committed batch");
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn list_books(&self) -> Result<Vec<Book>> {
        Ok(self.read()?.books())
    }

    fn list_stages(&self, book_id: &str) -> Result<Vec<Stage>> {
        Ok(self.read()?.stages_of(book_id))
    }

    fn list_tasks(&self, stage_id: &str) -> Result<Vec<Task>> {
        Ok(self.read()?.tasks_of(stage_id))
    }

    fn find_book(&self, id: &str) -> Result<Option<Book>> {
        Ok(self.read()?.book(id).cloned())
    }

    fn find_stage(&self, id: &str) -> Result<Option<Stage>> {
        Ok(self.read()?.stage(id).cloned())
    }

    fn find_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.read()?.task(id).cloned())
    }

    fn ids(&self, level: Level) -> Result<Vec<String>> {
        Ok(self.read()?.ids(level))
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        self.commit(&batch).map_err(|err| {
            warn!(path = %self.path.display(), error = %err, "batch rejected");
            err.into_storage_failure()
        })
    }

    fn begin_exclusive(&mut self) -> Result<()> {
        if self.held.is_none() {
            let lock = self.acquire().map_err(Error::into_storage_failure)?;
            debug!(lock = %lock.path().display(), "holding library lock");
            self.held = Some(lock);
        }
        Ok(())
    }

    fn end_exclusive(&mut self) {
        self.held = None;
    }
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    lock::write_atomic(path, json.as_bytes())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
