//! `data:` URL construction for embedding small images in QR codes.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Data URLs longer than this rarely scan reliably even at level L.
pub const MAX_CAPACITY_HINT: usize = 7000;

/// MIME type for an image extension, falling back to `image/jpeg`.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Build a base64 `data:` URL.
///
/// ```
/// use qrshare_qr::data_url;
///
/// assert_eq!(data_url(b"hi", "text/plain"), "data:text/plain;base64,aGk=");
/// ```
pub fn data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
