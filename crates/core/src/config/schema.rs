//! Configuration schema definitions
//!
//! Every section is optional; missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub qr: QrConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Externally visible address of the deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL that view/QR/download links are built from
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

/// Where derived artifacts and metadata live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for optimized images (`{id}.jpg`)
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// Directory for QR codes (`qr_{id}.png`)
    #[serde(default = "default_qr_dir")]
    pub qr_dir: PathBuf,

    /// JSON metadata document
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            qr_dir: default_qr_dir(),
            data_file: default_data_file(),
        }
    }
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("static/images")
}

fn default_qr_dir() -> PathBuf {
    PathBuf::from("static/qr_codes")
}

fn default_data_file() -> PathBuf {
    PathBuf::from("image_data.json")
}

/// Upload preconditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum payload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Accepted filename extensions (lowercase, no dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["png", "jpg", "jpeg", "gif", "bmp", "webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Size budget for stored images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Target upper bound on the stored JPEG, in KiB
    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: u32,

    /// Bound on width and height, in pixels
    #[serde(default = "default_max_dimension_px")]
    pub max_dimension_px: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_size_kb: default_max_size_kb(),
            max_dimension_px: default_max_dimension_px(),
        }
    }
}

fn default_max_size_kb() -> u32 {
    500
}

fn default_max_dimension_px() -> u32 {
    1920
}

/// QR rendering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    /// Pixels per module
    #[serde(default = "default_box_size")]
    pub box_size: u32,

    /// Quiet zone width, in modules
    #[serde(default = "default_border")]
    pub border: u32,

    /// Error correction level: L, M, Q or H
    #[serde(default = "default_error_correction")]
    pub error_correction: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            box_size: default_box_size(),
            border: default_border(),
            error_correction: default_error_correction(),
        }
    }
}

fn default_box_size() -> u32 {
    10
}

fn default_border() -> u32 {
    4
}

fn default_error_correction() -> String {
    "M".to_string()
}

/// Retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Records older than this are swept
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Also delete unreferenced files older than the threshold
    #[serde(default)]
    pub reclaim_orphans: bool,

    /// Period of the background sweeper; 0 sweeps only before uploads
    #[serde(default)]
    pub background_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            reclaim_orphans: false,
            background_interval_secs: 0,
        }
    }
}

fn default_max_age_days() -> u32 {
    7
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when neither QRSHARE_LOG nor RUST_LOG is set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of compact text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
