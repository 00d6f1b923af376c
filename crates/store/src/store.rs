//! JSON-file metadata store.
//!
//! The whole collection lives in one pretty-printed JSON object mapping id
//! to record. Every operation loads the full document and every mutation
//! rewrites it. A per-store mutex is held across load, mutate and save, so
//! concurrent mutations through the same [`MetadataStore`] never lose
//! updates. Writes go to a sibling temporary file that is then renamed over
//! the target.

use crate::record::{ArtifactRecord, RecordMap};
use crate::{Result, StoreError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// File-backed store for [`ArtifactRecord`]s.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MetadataStore {
    /// Open a store backed by `path`. The file is created on first save.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record.
    ///
    /// A missing or unparseable document yields an empty map; corruption is
    /// logged.
    pub fn load(&self) -> Result<RecordMap> {
        let _guard = self.guard();
        self.read_unlocked()
    }

    /// Replace the persisted document with `records`.
    pub fn save(&self, records: &RecordMap) -> Result<()> {
        let _guard = self.guard();
        self.write_unlocked(records)
    }

    /// Run `f` against the loaded records while holding the store lock.
    ///
    /// The document is rewritten only when `f` changed the map.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RecordMap) -> T,
    {
        let _guard = self.guard();
        let mut records = self.read_unlocked()?;
        let before = records.clone();

        let value = f(&mut records);

        if records != before {
            self.write_unlocked(&records)?;
        }
        Ok(value)
    }

    /// Look up one record.
    pub fn get(&self, id: &str) -> Result<Option<ArtifactRecord>> {
        Ok(self.load()?.remove(id))
    }

    /// Insert a new record.
    ///
    /// # Errors
    /// [`StoreError::DuplicateId`] if a record with the same id exists.
    pub fn insert(&self, record: ArtifactRecord) -> Result<()> {
        let _guard = self.guard();
        let mut records = self.read_unlocked()?;
        if records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        records.insert(record.id.clone(), record);
        self.write_unlocked(&records)
    }

    /// Remove a record, returning it if it existed.
    pub fn remove(&self, id: &str) -> Result<Option<ArtifactRecord>> {
        self.update(|records| records.remove(id))
    }

    /// Whether a record with this id exists.
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(id))
    }

    /// Number of records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The mutex guards no in-memory state, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_unlocked(&self) -> Result<RecordMap> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RecordMap::new()),
            Err(e) => return Err(StoreError::persistence(&self.path, e)),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(RecordMap::new());
        }

        // Invalid UTF-8 surfaces here as a JSON error too
        match serde_json::from_slice::<RecordMap>(&content) {
            Ok(mut records) => {
                for (id, record) in records.iter_mut() {
                    record.id.clone_from(id);
                }
                Ok(records)
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Metadata file is corrupt, starting from an empty store"
                );
                Ok(RecordMap::new())
            }
        }
    }

    fn write_unlocked(&self, records: &RecordMap) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| StoreError::persistence(&self.path, e))?;

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| StoreError::persistence(&self.path, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| StoreError::persistence(&self.path, e))?;
        temp.write_all(json.as_bytes())
            .and_then(|()| shareable(temp.as_file()))
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| StoreError::persistence(&self.path, e))?;
        temp.persist(&self.path)
            .map_err(|e| StoreError::persistence(&self.path, e.error))?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "Metadata saved");
        Ok(())
    }
}

/// Open up a temp file's owner-only mode to `0644` so other readers, such
/// as a static file server, can read the persisted result.
fn shareable(file: &fs::File) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    #[cfg(not(unix))]
    let _ = file;
    Ok(())
}
