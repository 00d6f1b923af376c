//! Metadata persistence and retention for QRShare
//!
//! - [`MetadataStore`]: JSON-file record store with serialized mutations
//! - [`retention`]: age-based sweeping of records and their files
//!
//! # Example
//!
//! ```rust,no_run
//! use qrshare_store::{retention, MetadataStore};
//!
//! let store = MetadataStore::open("image_data.json");
//! let removed = retention::sweep(&store, chrono::Utc::now(), retention::DEFAULT_MAX_AGE)?;
//! println!("{removed} expired uploads removed, {} left", store.len()?);
//! # Ok::<(), qrshare_store::StoreError>(())
//! ```

#![warn(missing_docs)]

mod error;
mod record;
pub mod retention;
mod store;
#[cfg(all(test, unix))]
mod testing;

pub use error::{Result, StoreError};
pub use record::{default_upload_time, parse_timestamp, ArtifactRecord, RecordMap};
pub use retention::{remove_file_best_effort, sweep, RetentionPolicy, SweepReport, Sweeper};
pub use store::MetadataStore;
