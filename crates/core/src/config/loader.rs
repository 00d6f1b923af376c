//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{Error, ErrorCode, Result};
use crate::validation::Validator;
use std::path::{Path, PathBuf};

/// Environment variable overriding `server.base_url`
pub const BASE_URL_ENV: &str = "QRSHARE_BASE_URL";

/// Configuration wrapper
#[derive(Debug, Clone)]
pub struct Config {
    pub schema: ConfigSchema,
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path or use defaults.
    ///
    /// An explicit path must exist; without one the standard locations are
    /// searched and defaults are used when none is found. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) if !p.exists() => return Err(Error::config_not_found(p)),
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(),
        };

        let mut schema = if let Some(ref p) = config_path {
            load_config_file(p)?
        } else {
            ConfigSchema::default()
        };

        apply_env_overrides(&mut schema, |key| std::env::var(key).ok());

        let config = Self {
            schema,
            path: config_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load with defaults only (no file)
    pub fn default() -> Self {
        Self {
            schema: ConfigSchema::default(),
            path: None,
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let s = &self.schema;
        Validator::new()
            .required("server.base_url", &s.server.base_url)
            .range("optimizer.max_dimension_px", s.optimizer.max_dimension_px, 1, 65_535)
            .range("optimizer.max_size_kb", s.optimizer.max_size_kb, 1, u32::MAX)
            .range("qr.box_size", s.qr.box_size, 1, 100)
            .range("retention.max_age_days", s.retention.max_age_days, 1, 3650)
            .one_of(
                "qr.error_correction",
                &s.qr.error_correction.to_ascii_uppercase(),
                &["L", "M", "Q", "H", "LOW", "MEDIUM", "QUARTILE", "HIGH"],
            )
            .custom("upload.allowed_extensions", || {
                s.upload
                    .allowed_extensions
                    .is_empty()
                    .then(|| "At least one extension must be allowed".to_string())
            })
            .validate()
            .to_result()
            .map_err(|e| Error::new(ErrorCode::ConfigValidationError, e.message))
    }

    /// Retention threshold as a `std::time::Duration`
    pub fn max_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.schema.retention.max_age_days) * 24 * 60 * 60)
    }
}

/// Find configuration file in standard locations
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("qrshare.toml"),
        PathBuf::from(".qrshare.toml"),
        PathBuf::from(".config/qrshare.toml"),
    ];

    candidates
        .into_iter()
        .chain(dirs::config_dir().map(|d| d.join("qrshare").join("qrshare.toml")))
        .find(|candidate| candidate.exists())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &Path) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::new(
            ErrorCode::ConfigParseError,
            format!("Failed to parse config file {}: {}", path.display(), e),
        )
    })
}

fn apply_env_overrides(schema: &mut ConfigSchema, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
        schema.server.base_url = base_url;
    }
}
