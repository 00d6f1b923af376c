//! Upload orchestration for QRShare
//!
//! [`UploadService`] ties the pipeline together: it validates an upload,
//! optimizes the image, writes it, renders a QR code for its view URL and
//! records both in the metadata store. It also serves the read-side lookups
//! an HTTP layer needs and applies the retention policy.
//!
//! # Example
//!
//! ```rust,no_run
//! use qrshare_core::config::Config;
//! use qrshare_service::{ServiceSettings, UploadService};
//! use qrshare_store::MetadataStore;
//!
//! let config = Config::load(None)?;
//! let settings = ServiceSettings::from_config(&config)?;
//! let service = UploadService::new(settings, MetadataStore::open(&config.schema.storage.data_file));
//!
//! let raw = std::fs::read("cat.png")?;
//! let receipt = service.handle_upload(&raw, "cat.png")?;
//! println!("scan to view: {}", receipt.view_url);
//! # Ok::<(), qrshare_core::Error>(())
//! ```

#![warn(missing_docs)]

mod background;
mod errors;
mod service;
mod settings;

pub use background::BackgroundSweeper;
pub use service::{
    Stats, UploadReceipt, UploadService, METRIC_OPTIMIZE, METRIC_QR_ENCODE, METRIC_SWEEP_REMOVED,
    METRIC_UPLOADS_ACCEPTED, METRIC_UPLOADS_REJECTED,
};
pub use settings::ServiceSettings;
