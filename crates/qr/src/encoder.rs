//! Text to QR raster encoding.

use crate::{QrError, Result};
use image::codecs::png::PngEncoder;
use image::{ColorType, GrayImage, ImageEncoder, Luma};
use qrcode::types::QrError as MatrixError;
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

/// QR error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ErrorCorrection {
    /// ~7% recovery
    Low,
    /// ~15% recovery
    #[default]
    Medium,
    /// ~25% recovery
    Quartile,
    /// ~30% recovery
    High,
}

impl ErrorCorrection {
    /// Single-letter name (`L`, `M`, `Q`, `H`).
    pub fn letter(self) -> char {
        match self {
            ErrorCorrection::Low => 'L',
            ErrorCorrection::Medium => 'M',
            ErrorCorrection::Quartile => 'Q',
            ErrorCorrection::High => 'H',
        }
    }

    fn ec_level(self) -> EcLevel {
        match self {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        }
    }
}

impl FromStr for ErrorCorrection {
    type Err = QrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" | "LOW" => Ok(ErrorCorrection::Low),
            "M" | "MEDIUM" => Ok(ErrorCorrection::Medium),
            "Q" | "QUARTILE" => Ok(ErrorCorrection::Quartile),
            "H" | "HIGH" => Ok(ErrorCorrection::High),
            other => Err(QrError::InvalidOptions(format!(
                "unknown error correction level '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for ErrorCorrection {
    type Error = QrError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ErrorCorrection> for String {
    fn from(value: ErrorCorrection) -> Self {
        value.letter().to_string()
    }
}

/// Rendering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrOptions {
    /// Pixels per module side
    pub box_size: u32,
    /// Quiet zone width in modules
    pub border: u32,
    /// Error correction level
    pub error_correction: ErrorCorrection,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            box_size: 10,
            border: 4,
            error_correction: ErrorCorrection::Medium,
        }
    }
}

/// A rendered QR code.
#[derive(Debug, Clone)]
pub struct QrImage {
    raster: GrayImage,
    modules: u32,
}

impl QrImage {
    /// Width of the symbol in modules, without the quiet zone.
    pub fn modules(&self) -> u32 {
        self.modules
    }

    /// Side length of the raster in pixels.
    pub fn size_px(&self) -> u32 {
        self.raster.width()
    }

    /// Borrow the grayscale raster (0 = dark, 255 = light).
    pub fn raster(&self) -> &GrayImage {
        &self.raster
    }

    /// Take the grayscale raster.
    pub fn into_raster(self) -> GrayImage {
        self.raster
    }

    /// Encode as an 8-bit grayscale PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(
                self.raster.as_raw(),
                self.raster.width(),
                self.raster.height(),
                ColorType::L8,
            )
            .map_err(|e| QrError::Render(e.to_string()))?;
        Ok(buffer)
    }

    /// Write the PNG to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_png()?)?;
        Ok(())
    }
}

/// Encode `text` as a QR code and render it.
///
/// The smallest version that holds `text` at the requested error
/// correction level is chosen automatically. Each module becomes an exact
/// `box_size`×`box_size` block, surrounded by `border` light modules.
///
/// # Errors
/// [`QrError::CapacityExceeded`] if `text` does not fit version 40;
/// [`QrError::InvalidOptions`] for a zero box size or a raster too large to
/// address.
///
/// # Example
/// ```
/// use qrshare_qr::{encode, QrOptions};
///
/// let qr = encode("https://example.com/view/abc-123", &QrOptions::default()).unwrap();
/// assert_eq!(qr.size_px(), (qr.modules() + 8) * 10);
/// ```
pub fn encode(text: &str, options: &QrOptions) -> Result<QrImage> {
    if options.box_size == 0 {
        return Err(QrError::InvalidOptions("box size must be at least 1 pixel".into()));
    }

    let code = QrCode::with_error_correction_level(text.as_bytes(), options.error_correction.ec_level())
        .map_err(|e| match e {
            MatrixError::DataTooLong => QrError::CapacityExceeded {
                len: text.len(),
                level: options.error_correction.letter(),
            },
            other => QrError::Encode(other.to_string()),
        })?;

    let modules = code.width() as u32;
    let size_px = modules
        .checked_add(options.border.saturating_mul(2))
        .and_then(|m| m.checked_mul(options.box_size))
        .filter(|&px| px <= 65_535)
        .ok_or_else(|| QrError::InvalidOptions("rendered QR code would be too large".into()))?;

    let mut raster = GrayImage::from_pixel(size_px, size_px, LIGHT);
    let offset = options.border * options.box_size;

    for (index, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let x0 = offset + (index as u32 % modules) * options.box_size;
        let y0 = offset + (index as u32 / modules) * options.box_size;
        for y in y0..y0 + options.box_size {
            for x in x0..x0 + options.box_size {
                raster.put_pixel(x, y, DARK);
            }
        }
    }

    tracing::debug!(
        modules,
        size_px,
        level = %options.error_correction.letter(),
        text_len = text.len(),
        "QR code rendered"
    );

    Ok(QrImage { raster, modules })
}
