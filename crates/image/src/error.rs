//! Error types for the image crate.

use thiserror::Error;

/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors that can occur during image operations.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Unknown image format
    #[error("Unknown image format")]
    UnknownFormat,

    /// Input could not be decoded as an image
    #[error("Image decode error: {0}")]
    Decode(String),

    /// Optimizer options that cannot produce an image
    #[error("Invalid optimize options: {0}")]
    InvalidOptions(String),

    /// JPEG/PNG encoding failed
    #[error("Image encode error: {0}")]
    Encode(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ImageError {
    /// Whether the input itself was unusable (as opposed to a failure while
    /// producing output from a valid image).
    pub fn is_decode(&self) -> bool {
        matches!(self, ImageError::Decode(_) | ImageError::UnknownFormat)
    }
}
