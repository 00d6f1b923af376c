//! Image optimization for QRShare.
//!
//! This crate provides:
//! - Format detection from magic bytes
//! - Alpha flattening onto an opaque background
//! - Aspect-preserving dimension capping
//! - Size-budget JPEG search ([`optimize`])
//!
//! # Example
//!
//! ```rust,no_run
//! use qrshare_image::{optimize, OptimizeOptions};
//!
//! let raw = std::fs::read("photo.png").unwrap();
//! let optimized = optimize(&raw, &OptimizeOptions::default()).unwrap();
//! println!("{}x{} in {} bytes", optimized.width, optimized.height, optimized.len());
//! ```

#![warn(missing_docs)]

mod detect;
mod dimensions;
mod error;
mod flatten;
mod optimize;

pub use detect::{detect_format, ImageFormat};
pub use dimensions::{cap_dimensions, fit_within, scale_dimensions, scale_image, RESAMPLE_FILTER};
pub use error::{ImageError, Result};
pub use flatten::{flatten_alpha, has_alpha_channel, WHITE};
pub use optimize::{
    encode_jpeg, optimize, OptimizeOptions, OptimizeStrategy, OptimizedImage, FLOOR_QUALITY,
    QUALITY_STEPS, SCALED_QUALITY, SCALE_STEPS,
};
