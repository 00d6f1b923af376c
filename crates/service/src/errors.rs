//! Mapping of component errors onto coded [`Error`]s.

use qrshare_core::{Error, ErrorCode};
use qrshare_image::ImageError;
use qrshare_qr::QrError;
use qrshare_store::StoreError;

pub(crate) fn from_image(err: ImageError) -> Error {
    match err {
        ImageError::Decode(message) => {
            Error::decode(format!("Uploaded file is not a readable image: {message}"))
        }
        ImageError::UnknownFormat => Error::new(ErrorCode::UnknownImageFormat, "Unknown image format")
            .with_suggestion("Upload a PNG, JPEG, GIF, BMP or WebP image"),
        ImageError::InvalidOptions(message) => {
            Error::new(ErrorCode::ConfigValidationError, format!("optimizer: {message}"))
        }
        ImageError::Encode(message) => Error::encoding(format!("Image encoding failed: {message}")),
        ImageError::IoError(e) => e.into(),
    }
}

pub(crate) fn from_qr(err: QrError) -> Error {
    match err {
        QrError::CapacityExceeded { .. } => Error::new(ErrorCode::CapacityExceeded, err.to_string())
            .with_suggestion("Shorten server.base_url or lower qr.error_correction"),
        QrError::Io(e) => e.into(),
        other => Error::encoding(other.to_string()),
    }
}

pub(crate) fn from_store(err: StoreError) -> Error {
    match err {
        StoreError::DuplicateId(id) => {
            Error::new(ErrorCode::DuplicateId, format!("Record id already exists: {id}"))
        }
        StoreError::Persistence { .. } => Error::persistence(err.to_string()),
        StoreError::Io(e) => Error::persistence(e.to_string()).with_source(e),
    }
}
