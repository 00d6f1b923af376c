//! Error types for QR encoding.

use thiserror::Error;

/// Result type alias for QR operations.
pub type Result<T> = std::result::Result<T, QrError>;

/// Errors that can occur while encoding or rendering a QR code.
#[derive(Debug, Error)]
pub enum QrError {
    /// Text does not fit even the largest version at this error correction level
    #[error("{len} bytes exceed QR capacity at error correction level {level}")]
    CapacityExceeded { len: usize, level: char },

    /// Rendering parameters cannot produce an image
    #[error("Invalid QR options: {0}")]
    InvalidOptions(String),

    /// Any other failure reported by the QR encoder
    #[error("QR encoding error: {0}")]
    Encode(String),

    /// PNG encoding failed
    #[error("QR render error: {0}")]
    Render(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
