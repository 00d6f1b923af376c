//! Upload orchestration.
//!
//! One upload runs, in order: validate, sweep expired uploads, pick an id,
//! optimize, write the image, encode the view URL, write the QR PNG and
//! finally insert the record. The record only becomes visible once both
//! files exist; if any step after the first write fails, the files written
//! so far are removed again.

use crate::errors::{from_image, from_qr, from_store};
use crate::ServiceSettings;
use chrono::Utc;
use qrshare_core::validation::{sanitize_filename, validate_upload};
use qrshare_core::{Error, Result, ResultExt};
use qrshare_store::{remove_file_best_effort, ArtifactRecord, MetadataStore, SweepReport, Sweeper};
use qrshare_telemetry::{metrics, Timer};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Counter of accepted uploads.
pub const METRIC_UPLOADS_ACCEPTED: &str = "uploads.accepted";
/// Counter of rejected uploads.
pub const METRIC_UPLOADS_REJECTED: &str = "uploads.rejected";
/// Counter of records removed by sweeps.
pub const METRIC_SWEEP_REMOVED: &str = "sweep.records_removed";
/// Optimizer duration histogram.
pub const METRIC_OPTIMIZE: &str = "optimize";
/// QR encoding duration histogram.
pub const METRIC_QR_ENCODE: &str = "qr.encode";

/// What a successful upload hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Record id
    pub id: String,
    /// Page that displays the image
    pub view_url: String,
    /// Inline QR code image
    pub qr_url: String,
    /// QR code as an attachment
    pub download_url: String,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    /// Number of live records
    pub total_images: usize,
    /// Sum of stored image sizes
    pub total_size_bytes: u64,
    /// Same, in MiB rounded to two decimals
    pub total_size_mb: f64,
}

/// Transport-agnostic upload service.
///
/// `Send + Sync`; share it through an `Arc`. All record mutations are
/// serialized by the underlying [`MetadataStore`].
#[derive(Debug)]
pub struct UploadService {
    settings: ServiceSettings,
    store: MetadataStore,
    sweeper: Sweeper,
}

impl UploadService {
    /// Create a service over `store`.
    pub fn new(settings: ServiceSettings, store: MetadataStore) -> Self {
        let sweeper = Sweeper::new(
            settings.retention,
            [settings.images_dir.clone(), settings.qr_dir.clone()],
        );
        Self {
            settings,
            store,
            sweeper,
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Underlying metadata store.
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Accept one upload.
    ///
    /// # Errors
    /// - `EmptyFilename`, `UnsupportedFormat`, `PayloadTooLarge` before any work
    /// - `DecodeError` if the payload is not an image
    /// - `CapacityExceeded` if the view URL does not fit a QR code
    /// - file-system or persistence errors while writing artifacts
    pub fn handle_upload(&self, raw: &[u8], filename: &str) -> Result<UploadReceipt> {
        match self.try_upload(raw, filename) {
            Ok(receipt) => {
                metrics().increment(METRIC_UPLOADS_ACCEPTED);
                Ok(receipt)
            }
            Err(e) => {
                metrics().increment(METRIC_UPLOADS_REJECTED);
                tracing::warn!(filename, code = %e.code, error = %e.message, "Upload rejected");
                Err(e)
            }
        }
    }

    fn try_upload(&self, raw: &[u8], filename: &str) -> Result<UploadReceipt> {
        validate_upload(
            filename,
            raw.len(),
            self.settings.max_upload_bytes,
            &self.settings.allowed_extensions,
        )?;

        if let Err(e) = self.sweep() {
            tracing::warn!(error = %e, "Pre-upload sweep failed, continuing with upload");
        }

        let id = self.new_id()?;

        let optimized = {
            let _timer = Timer::start(METRIC_OPTIMIZE);
            qrshare_image::optimize(raw, &self.settings.optimize).map_err(from_image)?
        };

        let mut written = WrittenFiles::default();

        let image_path = self.image_path(&id);
        write_atomic(&image_path, &optimized.bytes)?;
        written.push(image_path.clone());

        let view_url = self.view_url(&id);
        let qr_png = {
            let _timer = Timer::start(METRIC_QR_ENCODE);
            qrshare_qr::encode(&view_url, &self.settings.qr)
                .and_then(|qr| qr.to_png())
                .map_err(from_qr)?
        };

        let qr_path = self.qr_path(&id);
        write_atomic(&qr_path, &qr_png)?;
        written.push(qr_path.clone());

        let record = ArtifactRecord {
            id: id.clone(),
            original_name: sanitize_filename(filename),
            image_path,
            qr_path,
            upload_time: Utc::now(),
            view_url: view_url.clone(),
            file_size: optimized.len() as u64,
        };
        self.store.insert(record).map_err(from_store)?;
        written.keep();

        tracing::info!(
            id = %id,
            input_bytes = raw.len(),
            stored_bytes = optimized.len(),
            width = optimized.width,
            height = optimized.height,
            strategy = ?optimized.strategy,
            "Upload stored"
        );

        Ok(UploadReceipt {
            qr_url: self.qr_url(&id),
            download_url: self.download_url(&id),
            view_url,
            id,
        })
    }

    fn new_id(&self) -> Result<String> {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.store.contains(&id).map_err(from_store)? && !self.image_path(&id).exists() {
                return Ok(id);
            }
            tracing::debug!(id = %id, "Generated id already in use, retrying");
        }
    }

    /// Look up a live record.
    pub fn record(&self, id: &str) -> Result<ArtifactRecord> {
        self.store
            .get(id)
            .map_err(from_store)?
            .ok_or_else(|| Error::not_found(id))
    }

    /// Path of the stored image, if the record and file both exist.
    pub fn image_file(&self, id: &str) -> Result<PathBuf> {
        existing(self.record(id)?.image_path, id)
    }

    /// Path of the QR code PNG, if the record and file both exist.
    pub fn qr_file(&self, id: &str) -> Result<PathBuf> {
        existing(self.record(id)?.qr_path, id)
    }

    /// Attachment filename for a QR download.
    pub fn qr_download_name(id: &str) -> String {
        format!("qr_code_{id}.png")
    }

    /// Totals over every live record.
    pub fn stats(&self) -> Result<Stats> {
        let records = self.store.load().map_err(from_store)?;
        let total_size_bytes: u64 = records.values().map(|r| r.file_size).sum();
        Ok(Stats {
            total_images: records.len(),
            total_size_bytes,
            total_size_mb: round_mb(total_size_bytes),
        })
    }

    /// Remove a record and its files. Returns `false` if no such record.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .store
            .update(|records| {
                records.remove(id).inspect(|record| {
                    remove_file_best_effort(&record.image_path);
                    remove_file_best_effort(&record.qr_path);
                })
            })
            .map_err(from_store)?;

        if removed.is_some() {
            tracing::info!(id, "Upload deleted");
        }
        Ok(removed.is_some())
    }

    /// Apply the retention policy now.
    pub fn sweep(&self) -> Result<SweepReport> {
        let report = self.sweeper.run(&self.store, Utc::now()).map_err(from_store)?;
        if report.records_removed > 0 {
            metrics().increment_by(METRIC_SWEEP_REMOVED, report.records_removed as u64);
        }
        Ok(report)
    }

    /// `{base}/view/{id}`
    pub fn view_url(&self, id: &str) -> String {
        format!("{}/view/{id}", self.settings.base_url)
    }

    /// `{base}/qr/{id}`
    pub fn qr_url(&self, id: &str) -> String {
        format!("{}/qr/{id}", self.settings.base_url)
    }

    /// `{base}/download-qr/{id}`
    pub fn download_url(&self, id: &str) -> String {
        format!("{}/download-qr/{id}", self.settings.base_url)
    }

    /// `{base}/image/{id}`
    pub fn image_url(&self, id: &str) -> String {
        format!("{}/image/{id}", self.settings.base_url)
    }

    fn image_path(&self, id: &str) -> PathBuf {
        self.settings.images_dir.join(format!("{id}.jpg"))
    }

    fn qr_path(&self, id: &str) -> PathBuf {
        self.settings.qr_dir.join(format!("qr_{id}.png"))
    }
}

fn existing(path: PathBuf, id: &str) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::not_found(id).with_context(format!("missing file {}", path.display())))
    }
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Write through a sibling temp file so readers never see a partial file.
///
/// The result is `0644` on Unix, readable by a separate static file server.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir)
        .map_err(Error::from)
        .context(format!("creating {}", dir.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    temp.persist(path).map_err(|e| {
        Error::file_system(format!("Failed to write {}", path.display())).with_source(e.error)
    })?;
    Ok(())
}

/// Files written by an in-flight upload, removed on drop unless kept.
#[derive(Default)]
struct WrittenFiles(Vec<PathBuf>);

impl WrittenFiles {
    fn push(&mut self, path: PathBuf) {
        self.0.push(path);
    }

    fn keep(mut self) {
        self.0.clear();
    }
}

impl Drop for WrittenFiles {
    fn drop(&mut self) {
        for path in self.0.drain(..) {
            remove_file_best_effort(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TimeDelta;
    use qrshare_core::ErrorCode;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        service: UploadService,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with(|_| {})
        }

        fn with(tweak: impl FnOnce(&mut ServiceSettings)) -> Self {
            let dir = TempDir::new().unwrap();
            let mut settings = ServiceSettings::rooted_at(dir.path());
            tweak(&mut settings);
            let store = MetadataStore::open(dir.path().join("image_data.json"));
            Self {
                service: UploadService::new(settings, store),
                dir,
            }
        }

        fn file_count(&self, sub: &str) -> usize {
            fs::read_dir(self.dir.path().join(sub))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn decode_qr(path: &Path) -> String {
        let img = image::open(path).unwrap().to_luma8();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            img.width() as usize,
            img.height() as usize,
            |x, y| img.get_pixel(x as u32, y as u32)[0],
        );
        let grids = prepared.detect_grids();
        assert_eq!(grids.len(), 1);
        grids[0].decode().unwrap().1
    }

    #[test]
    fn test_upload_produces_artifacts_and_record() {
        let fx = Fixture::new();
        let receipt = fx.service.handle_upload(&png(64, 48), "My Cat.png").unwrap();

        assert_eq!(receipt.view_url, format!("http://localhost:5000/view/{}", receipt.id));
        assert_eq!(receipt.qr_url, format!("http://localhost:5000/qr/{}", receipt.id));
        assert_eq!(
            receipt.download_url,
            format!("http://localhost:5000/download-qr/{}", receipt.id)
        );

        let record = fx.service.record(&receipt.id).unwrap();
        assert_eq!(record.original_name, "My_Cat.png");
        assert_eq!(record.view_url, receipt.view_url);

        let image_path = fx.service.image_file(&receipt.id).unwrap();
        let stored = fs::read(&image_path).unwrap();
        assert_eq!(stored.len() as u64, record.file_size);
        assert_eq!(&stored[..2], &[0xFF, 0xD8]);
        assert!(image_path.ends_with(format!("{}.jpg", receipt.id)));

        let qr_path = fx.service.qr_file(&receipt.id).unwrap();
        assert!(qr_path.ends_with(format!("qr_{}.png", receipt.id)));
        assert_eq!(decode_qr(&qr_path), receipt.view_url);
    }

    #[test]
    fn test_transparent_upload_is_flattened() {
        let fx = Fixture::new();
        let img = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 0]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();

        let receipt = fx.service.handle_upload(&buf, "clear.PNG").unwrap();
        let stored = image::open(fx.service.image_file(&receipt.id).unwrap()).unwrap();
        assert!(!stored.color().has_alpha());
        let pixel = stored.to_rgb8().get_pixel(16, 16).0;
        assert!(pixel.iter().all(|&c| c > 240));
    }

    #[test]
    fn test_precondition_failures() {
        let fx = Fixture::with(|s| s.max_upload_bytes = 1024);

        let err = fx.service.handle_upload(b"data", "notes.txt").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedFormat);

        let err = fx.service.handle_upload(b"data", "").unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyFilename);

        let err = fx.service.handle_upload(&vec![0u8; 2048], "big.png").unwrap_err();
        assert_eq!(err.code, ErrorCode::PayloadTooLarge);

        assert_eq!(fx.service.stats().unwrap().total_images, 0);
    }

    #[test]
    fn test_decode_failure_leaves_nothing_behind() {
        let fx = Fixture::new();
        let err = fx.service.handle_upload(b"definitely not an image", "fake.png").unwrap_err();

        assert_eq!(err.code, ErrorCode::DecodeError);
        assert_eq!(fx.file_count("images"), 0);
        assert_eq!(fx.file_count("qr_codes"), 0);
        assert!(fx.service.store().is_empty().unwrap());
    }

    #[test]
    fn test_qr_failure_removes_written_image() {
        let fx = Fixture::with(|s| s.base_url = format!("https://{}", "a".repeat(3000)));
        let err = fx.service.handle_upload(&png(16, 16), "a.png").unwrap_err();

        assert_eq!(err.code, ErrorCode::CapacityExceeded);
        assert_eq!(fx.file_count("images"), 0);
        assert_eq!(fx.file_count("qr_codes"), 0);
        assert!(fx.service.store().is_empty().unwrap());
    }

    #[test]
    fn test_unusable_store_rejects_upload() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"regular file").unwrap();
        let service = UploadService::new(
            ServiceSettings::rooted_at(dir.path()),
            MetadataStore::open(blocker.join("image_data.json")),
        );

        assert_eq!(service.sweep().unwrap_err().code, ErrorCode::PersistenceError);
        let err = service.handle_upload(&png(16, 16), "a.png").unwrap_err();
        assert_eq!(err.code, ErrorCode::PersistenceError);
        assert!(fs::read_dir(dir.path().join("images")).map_or(true, |mut d| d.next().is_none()));
        assert!(fs::read_dir(dir.path().join("qr_codes")).map_or(true, |mut d| d.next().is_none()));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_record_insert_removes_written_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let service = UploadService::new(
            ServiceSettings::rooted_at(dir.path()),
            MetadataStore::open(data_dir.join("image_data.json")),
        );

        fs::set_permissions(&data_dir, fs::Permissions::from_mode(0o555)).unwrap();
        let writable = fs::write(data_dir.join(".write-check"), b"").is_ok();
        let result = (!writable).then(|| service.handle_upload(&png(16, 16), "a.png"));
        fs::set_permissions(&data_dir, fs::Permissions::from_mode(0o755)).unwrap();

        // Permission bits do not stop a privileged user
        let Some(result) = result else { return };
        assert_eq!(result.unwrap_err().code, ErrorCode::PersistenceError);
        let images = fs::read_dir(dir.path().join("images")).unwrap().count();
        let qr_codes = fs::read_dir(dir.path().join("qr_codes")).unwrap().count();
        assert_eq!((images, qr_codes), (0, 0));
        assert!(service.store().is_empty().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_artifacts_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let receipt = fx.service.handle_upload(&png(16, 16), "a.png").unwrap();
        for path in [
            fx.service.image_file(&receipt.id).unwrap(),
            fx.service.qr_file(&receipt.id).unwrap(),
        ] {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644, "{}", path.display());
        }
    }

    #[test]
    fn test_consecutive_uploads_survive_sweep() {
        let fx = Fixture::new();
        let a = fx.service.handle_upload(&png(20, 20), "a.png").unwrap();
        let b = fx.service.handle_upload(&png(30, 30), "b.jpg.png").unwrap();

        assert_ne!(a.id, b.id);
        assert!(fx.service.record(&a.id).is_ok());
        assert!(fx.service.record(&b.id).is_ok());
        assert_eq!(fx.service.stats().unwrap().total_images, 2);
    }

    #[test]
    fn test_upload_sweeps_expired_records() {
        let fx = Fixture::new();
        let old = fx.service.handle_upload(&png(20, 20), "old.png").unwrap();
        let old_record = fx.service.record(&old.id).unwrap();

        fx.service
            .store()
            .update(|records| {
                if let Some(r) = records.get_mut(&old.id) {
                    r.upload_time = Utc::now() - TimeDelta::days(8);
                }
            })
            .unwrap();

        let fresh = fx.service.handle_upload(&png(20, 20), "fresh.png").unwrap();

        assert_eq!(fx.service.record(&old.id).unwrap_err().code, ErrorCode::NotFound);
        assert!(!old_record.image_path.exists());
        assert!(!old_record.qr_path.exists());
        assert!(fx.service.record(&fresh.id).is_ok());
    }

    #[test]
    fn test_lookup_not_found() {
        let fx = Fixture::new();
        assert_eq!(fx.service.record("nope").unwrap_err().code, ErrorCode::NotFound);
        assert_eq!(fx.service.image_file("nope").unwrap_err().code, ErrorCode::NotFound);
        assert_eq!(fx.service.qr_file("nope").unwrap_err().code, ErrorCode::NotFound);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let fx = Fixture::new();
        let receipt = fx.service.handle_upload(&png(20, 20), "a.png").unwrap();
        fs::remove_file(fx.service.qr_file(&receipt.id).unwrap()).unwrap();

        assert_eq!(fx.service.qr_file(&receipt.id).unwrap_err().code, ErrorCode::NotFound);
        assert!(fx.service.image_file(&receipt.id).is_ok());
    }

    #[test]
    fn test_delete() {
        let fx = Fixture::new();
        let receipt = fx.service.handle_upload(&png(20, 20), "a.png").unwrap();
        let record = fx.service.record(&receipt.id).unwrap();

        assert!(fx.service.delete(&receipt.id).unwrap());
        assert!(!record.image_path.exists());
        assert!(!record.qr_path.exists());
        assert!(!fx.service.delete(&receipt.id).unwrap());
    }

    #[test]
    fn test_stats_rounding() {
        let fx = Fixture::new();
        fx.service
            .store()
            .update(|records| {
                for (id, size) in [("a", 1_048_576u64), ("b", 524_288), ("c", 1_000)] {
                    let mut record: ArtifactRecord = serde_json::from_str("{}").unwrap();
                    record.id = id.to_string();
                    record.upload_time = Utc::now();
                    record.file_size = size;
                    records.insert(id.to_string(), record);
                }
            })
            .unwrap();

        let stats = fx.service.stats().unwrap();
        assert_eq!(stats.total_images, 3);
        assert_eq!(stats.total_size_bytes, 1_573_864);
        assert_eq!(stats.total_size_mb, 1.5);
    }

    #[test]
    fn test_urls_and_download_name() {
        let fx = Fixture::with(|s| s.base_url = "https://qr.example.com".into());
        assert_eq!(fx.service.image_url("x"), "https://qr.example.com/image/x");
        assert_eq!(UploadService::qr_download_name("x"), "qr_code_x.png");
    }

    #[test]
    fn test_concurrent_uploads_all_recorded() {
        let fx = Fixture::new();
        let service = Arc::new(fx.service);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = Arc::clone(&service);
                thread::spawn(move || service.handle_upload(&png(16 + i, 16), "c.png").unwrap())
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap().id).collect();

        assert_eq!(service.stats().unwrap().total_images, 4);
        for id in ids {
            assert!(service.record(&id).is_ok());
        }
    }

    #[test]
    fn test_upload_metrics() {
        let fx = Fixture::new();
        let accepted = metrics().counter(METRIC_UPLOADS_ACCEPTED);
        let rejected = metrics().counter(METRIC_UPLOADS_REJECTED);

        fx.service.handle_upload(&png(8, 8), "m.png").unwrap();
        let _ = fx.service.handle_upload(b"x", "m.exe");

        assert!(metrics().counter(METRIC_UPLOADS_ACCEPTED) > accepted);
        assert!(metrics().counter(METRIC_UPLOADS_REJECTED) > rejected);
    }
}
