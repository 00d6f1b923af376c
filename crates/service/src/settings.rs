//! Runtime settings derived from [`Config`].

use qrshare_core::config::Config;
use qrshare_core::{Error, ErrorCode, Result};
use qrshare_image::OptimizeOptions;
use qrshare_qr::{ErrorCorrection, QrOptions};
use qrshare_store::RetentionPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Everything [`UploadService`](crate::UploadService) needs to run.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Prefix of every generated URL, without a trailing slash
    pub base_url: String,
    /// Directory for optimized images
    pub images_dir: PathBuf,
    /// Directory for QR code PNGs
    pub qr_dir: PathBuf,
    /// Largest accepted upload
    pub max_upload_bytes: usize,
    /// Accepted filename extensions, lowercase
    pub allowed_extensions: Vec<String>,
    /// Optimizer budget and caps
    pub optimize: OptimizeOptions,
    /// QR rendering
    pub qr: QrOptions,
    /// Retention threshold and orphan handling
    pub retention: RetentionPolicy,
    /// Period of the background sweeper, if enabled
    pub background_interval: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            images_dir: PathBuf::from("static/images"),
            qr_dir: PathBuf::from("static/qr_codes"),
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "bmp", "webp"]
                .map(String::from)
                .to_vec(),
            optimize: OptimizeOptions::default(),
            qr: QrOptions::default(),
            retention: RetentionPolicy::default(),
            background_interval: None,
        }
    }
}

impl ServiceSettings {
    /// Build settings from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let s = &config.schema;

        let error_correction: ErrorCorrection = s.qr.error_correction.parse().map_err(|e| {
            Error::new(ErrorCode::ConfigValidationError, format!("qr.error_correction: {e}"))
        })?;

        Ok(Self {
            base_url: s.server.base_url.trim_end_matches('/').to_string(),
            images_dir: s.storage.images_dir.clone(),
            qr_dir: s.storage.qr_dir.clone(),
            max_upload_bytes: s.upload.max_upload_bytes,
            allowed_extensions: s
                .upload
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            optimize: OptimizeOptions::new(s.optimizer.max_size_kb, s.optimizer.max_dimension_px),
            qr: QrOptions {
                box_size: s.qr.box_size,
                border: s.qr.border,
                error_correction,
            },
            retention: RetentionPolicy {
                max_age: config.max_age(),
                reclaim_orphans: s.retention.reclaim_orphans,
            },
            background_interval: (s.retention.background_interval_secs > 0)
                .then(|| Duration::from_secs(s.retention.background_interval_secs)),
        })
    }

    /// Settings rooted under `dir`, for tools and tests that want an
    /// isolated store.
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            images_dir: dir.join("images"),
            qr_dir: dir.join("qr_codes"),
            ..Self::default()
        }
    }
}
