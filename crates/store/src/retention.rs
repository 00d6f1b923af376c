//! Retention sweeping.
//!
//! Records older than the retention threshold are removed together with
//! their files. File deletion is best effort: a missing file is fine and
//! other failures are logged, never raised. Only a failure to persist the
//! shrunken collection is an error.

use crate::record::RecordMap;
use crate::{MetadataStore, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default retention threshold: 7 days.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long artifacts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Records strictly older than this are swept
    pub max_age: Duration,
    /// Also delete unreferenced files older than `max_age`
    pub reclaim_orphans: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            reclaim_orphans: false,
        }
    }
}

/// Outcome of one [`Sweeper::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired records removed from the store
    pub records_removed: usize,
    /// Unreferenced files deleted
    pub orphans_removed: usize,
}

/// Delete a file, logging anything other than "not found".
///
/// Returns `true` only if this call removed the file.
pub fn remove_file_best_effort(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
            false
        }
    }
}

/// Remove every record older than `max_age` at `now`, and its files.
///
/// Runs as a single store update, so the collection is persisted once and
/// only when something was removed.
///
/// # Errors
/// Persistence failures from the store.
pub fn sweep(store: &MetadataStore, now: DateTime<Utc>, max_age: Duration) -> Result<usize> {
    let removed = store.update(|records| remove_expired(records, now, max_age))?;
    if removed > 0 {
        tracing::info!(removed, max_age_secs = max_age.as_secs(), "Expired uploads swept");
    }
    Ok(removed)
}

fn remove_expired(records: &mut RecordMap, now: DateTime<Utc>, max_age: Duration) -> usize {
    let expired: Vec<String> = records
        .iter()
        .filter(|(_, record)| record.is_expired(now, max_age))
        .map(|(id, _)| id.clone())
        .collect();

    for id in &expired {
        if let Some(record) = records.remove(id) {
            remove_file_best_effort(&record.image_path);
            remove_file_best_effort(&record.qr_path);
            tracing::debug!(id = %id, uploaded = %record.upload_time, "Swept record");
        }
    }

    expired.len()
}

/// Applies a [`RetentionPolicy`] to a store and its artifact directories.
#[derive(Debug, Clone)]
pub struct Sweeper {
    policy: RetentionPolicy,
    artifact_dirs: Vec<PathBuf>,
}

impl Sweeper {
    /// Sweeper for the directories holding images and QR codes.
    pub fn new(policy: RetentionPolicy, artifact_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            policy,
            artifact_dirs: artifact_dirs.into_iter().collect(),
        }
    }

    /// Policy in effect.
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Sweep expired records, then reclaim orphans if the policy asks for it.
    pub fn run(&self, store: &MetadataStore, now: DateTime<Utc>) -> Result<SweepReport> {
        let records_removed = sweep(store, now, self.policy.max_age)?;

        let orphans_removed = if self.policy.reclaim_orphans {
            self.reclaim_orphans(store, now)?
        } else {
            0
        };

        Ok(SweepReport {
            records_removed,
            orphans_removed,
        })
    }

    /// Delete files in the artifact directories that no record references
    /// and that were last modified more than `max_age` before `now`.
    ///
    /// The age guard keeps files of an upload that is still in flight.
    pub fn reclaim_orphans(&self, store: &MetadataStore, now: DateTime<Utc>) -> Result<usize> {
        let records = store.load()?;
        let referenced: HashSet<OsString> = records
            .values()
            .flat_map(|r| [r.image_path.file_name(), r.qr_path.file_name()])
            .flatten()
            .map(|name| name.to_os_string())
            .collect();
        let store_name = store.path().file_name().map(|n| n.to_os_string());
        let now = SystemTime::from(now);

        let mut removed = 0;
        for dir in &self.artifact_dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Cannot scan for orphans");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let name = entry.file_name();
                if referenced.contains(&name) || store_name.as_ref() == Some(&name) {
                    continue;
                }
                let Ok(metadata) = entry.metadata() else { continue };
                if !metadata.is_file() {
                    continue;
                }
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok());
                if age.is_some_and(|age| age > self.policy.max_age)
                    && remove_file_best_effort(&entry.path())
                {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Orphaned artifact files reclaimed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::testing::ReadOnlyDir;
    use crate::{ArtifactRecord, StoreError};
    use chrono::Duration as TimeDelta;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: MetadataStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("images")).unwrap();
            fs::create_dir_all(dir.path().join("qr")).unwrap();
            let store = MetadataStore::open(dir.path().join("image_data.json"));
            Self { dir, store }
        }

        fn add(&self, id: &str, uploaded: DateTime<Utc>) -> ArtifactRecord {
            let image_path = self.dir.path().join("images").join(format!("{id}.jpg"));
            let qr_path = self.dir.path().join("qr").join(format!("qr_{id}.png"));
            fs::write(&image_path, b"jpeg").unwrap();
            fs::write(&qr_path, b"png").unwrap();

            let record = ArtifactRecord {
                id: id.to_string(),
                original_name: format!("{id}.png"),
                image_path,
                qr_path,
                upload_time: uploaded,
                view_url: format!("http://localhost:5000/view/{id}"),
                file_size: 4,
            };
            self.store.insert(record.clone()).unwrap();
            record
        }

        fn dirs(&self) -> Vec<PathBuf> {
            vec![self.dir.path().join("images"), self.dir.path().join("qr")]
        }
    }

    #[test]
    fn test_eight_day_old_record_swept_once() {
        let fx = Fixture::new();
        let now = Utc::now();
        let old = fx.add("old", now - TimeDelta::days(8));

        assert_eq!(sweep(&fx.store, now, DEFAULT_MAX_AGE).unwrap(), 1);
        assert!(!old.image_path.exists());
        assert!(!old.qr_path.exists());
        assert!(fx.store.get("old").unwrap().is_none());

        assert_eq!(sweep(&fx.store, now, DEFAULT_MAX_AGE).unwrap(), 0);
    }

    #[test]
    fn test_sweep_keeps_fresh_records() {
        let fx = Fixture::new();
        let now = Utc::now();
        fx.add("old", now - TimeDelta::days(30));
        let fresh = fx.add("fresh", now - TimeDelta::days(6));
        fx.add("edge", now - TimeDelta::days(7));

        assert_eq!(sweep(&fx.store, now, DEFAULT_MAX_AGE).unwrap(), 1);
        assert_eq!(fx.store.len().unwrap(), 2);
        assert!(fresh.image_path.exists());
    }

    #[test]
    fn test_missing_files_do_not_block_sweep() {
        let fx = Fixture::new();
        let now = Utc::now();
        let old = fx.add("old", now - TimeDelta::days(8));
        fs::remove_file(&old.image_path).unwrap();

        assert_eq!(sweep(&fx.store, now, DEFAULT_MAX_AGE).unwrap(), 1);
        assert!(!old.qr_path.exists());
    }

    #[test]
    fn test_nothing_expired_leaves_document_untouched() {
        let fx = Fixture::new();
        let now = Utc::now();
        fx.add("fresh", now);
        let before = fs::metadata(fx.store.path()).unwrap().modified().unwrap();
        let content = fs::read_to_string(fx.store.path()).unwrap();

        assert_eq!(sweep(&fx.store, now, DEFAULT_MAX_AGE).unwrap(), 0);
        assert_eq!(fs::read_to_string(fx.store.path()).unwrap(), content);
        assert_eq!(fs::metadata(fx.store.path()).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_unreadable_store_fails_sweep() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"regular file").unwrap();
        let store = MetadataStore::open(blocker.join("image_data.json"));

        let err = sweep(&store, Utc::now(), DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_persist_after_sweep_is_reported() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let store = MetadataStore::open(data_dir.join("image_data.json"));
        let now = Utc::now();
        let image_path = dir.path().join("old.jpg");
        fs::write(&image_path, b"jpeg").unwrap();
        let defaults: ArtifactRecord = serde_json::from_str("{}").unwrap();
        store
            .insert(ArtifactRecord {
                id: "old".to_string(),
                image_path,
                upload_time: now - TimeDelta::days(8),
                ..defaults
            })
            .unwrap();

        let Some(_restore) = ReadOnlyDir::lock(&data_dir) else {
            return;
        };
        let err = sweep(&store, now, DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
        // The document still lists the record
        assert!(store.contains("old").unwrap());
    }

    #[test]
    fn test_remove_file_best_effort() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        assert!(remove_file_best_effort(&path));
        assert!(!remove_file_best_effort(&path));
        assert!(!remove_file_best_effort(Path::new("")));
        // A directory cannot be removed as a file
        assert!(!remove_file_best_effort(dir.path()));
    }

    #[test]
    fn test_sweeper_without_orphan_reclaim() {
        let fx = Fixture::new();
        let orphan = fx.dir.path().join("images").join("stray.jpg");
        fs::write(&orphan, b"x").unwrap();

        let sweeper = Sweeper::new(RetentionPolicy::default(), fx.dirs());
        let far_future = Utc::now() + TimeDelta::days(30);
        let report = sweeper.run(&fx.store, far_future).unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(orphan.exists());
    }

    #[test]
    fn test_sweeper_reclaims_old_orphans_only() {
        let fx = Fixture::new();
        let now = Utc::now();
        let kept = fx.add("kept", now + TimeDelta::days(30));
        let orphan = fx.dir.path().join("images").join("stray.jpg");
        fs::write(&orphan, b"x").unwrap();

        let policy = RetentionPolicy {
            reclaim_orphans: true,
            ..RetentionPolicy::default()
        };
        let sweeper = Sweeper::new(policy, fx.dirs());

        // Fresh orphan survives
        assert_eq!(sweeper.run(&fx.store, now).unwrap().orphans_removed, 0);
        assert!(orphan.exists());

        // Eight days on, the orphan goes but referenced files stay
        let later = now + TimeDelta::days(8);
        let report = sweeper.run(&fx.store, later).unwrap();
        assert_eq!(report.records_removed, 0);
        assert_eq!(report.orphans_removed, 1);
        assert!(!orphan.exists());
        assert!(kept.image_path.exists());
        assert!(kept.qr_path.exists());
        assert!(fx.store.path().exists());
    }
}
