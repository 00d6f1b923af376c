//! QR code generation for QRShare
//!
//! Encodes short texts (usually a view URL) into a square grayscale QR
//! raster and PNG, plus helpers for `data:` URL payloads.

pub mod data_url;
pub mod encoder;
pub mod error;

pub use data_url::{data_url, mime_for_extension, MAX_CAPACITY_HINT};
pub use encoder::{encode, ErrorCorrection, QrImage, QrOptions};
pub use error::{QrError, Result};
