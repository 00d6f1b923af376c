//! Size-budget JPEG optimization.
//!
//! The optimizer normalizes an arbitrary upload into an opaque RGB image no
//! larger than `max_dimension_px` on either side, then walks a fixed attempt
//! plan until an encoding fits the byte budget:
//!
//! 1. the capped image at each quality in [`QUALITY_STEPS`],
//! 2. the capped image scaled by each factor in [`SCALE_STEPS`] at
//!    [`SCALED_QUALITY`],
//! 3. the smallest scaled image at [`FLOOR_QUALITY`], returned whatever its
//!    size.
//!
//! Only a decode failure is an error. An encode failure skips to the next
//! attempt; if the floor encode fails too, the input bytes are handed back
//! unchanged with [`OptimizeStrategy::Passthrough`].

use crate::dimensions::{cap_dimensions, scale_image};
use crate::flatten::{flatten_alpha, WHITE};
use crate::{ImageError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use serde::Serialize;

/// JPEG qualities tried on the dimension-capped image, best first.
pub const QUALITY_STEPS: [u8; 6] = [85, 75, 65, 55, 45, 35];

/// Scale factors tried once every quality step is over budget.
pub const SCALE_STEPS: [f32; 3] = [0.8, 0.6, 0.4];

/// Quality used for every scaled attempt.
pub const SCALED_QUALITY: u8 = 30;

/// Quality of the unconditional last encode.
pub const FLOOR_QUALITY: u8 = 20;

/// Options for [`optimize`].
#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    /// Target upper bound on the output, in KiB
    pub max_size_kb: u32,
    /// Bound on output width and height
    pub max_dimension_px: u32,
    /// Background composited under transparent pixels
    pub background: [u8; 3],
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_size_kb: 500,
            max_dimension_px: 1920,
            background: WHITE,
        }
    }
}

impl OptimizeOptions {
    /// Options with the given budget and dimension cap.
    pub fn new(max_size_kb: u32, max_dimension_px: u32) -> Self {
        Self {
            max_size_kb,
            max_dimension_px,
            ..Self::default()
        }
    }

    /// Byte budget.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_kb as usize * 1024
    }
}

/// How the returned bytes were produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizeStrategy {
    /// Dimension-capped image at this quality
    Quality(u8),
    /// Scaled image at the fixed scaled quality
    Scaled { scale: f32, quality: u8 },
    /// Nothing met the budget; smallest image at the quality floor
    Floor { scale: f32, quality: u8 },
    /// Every encode failed; original input returned unchanged
    Passthrough,
}

/// Result of [`optimize`].
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    /// Encoded bytes (JPEG unless the strategy is `Passthrough`)
    pub bytes: Vec<u8>,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Attempt that produced `bytes`
    pub strategy: OptimizeStrategy,
}

impl OptimizedImage {
    /// Output size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the output is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the output fits `max_size_kb`.
    pub fn within_budget(&self, max_size_kb: u32) -> bool {
        self.bytes.len() <= max_size_kb as usize * 1024
    }

    /// Take the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// One step of the search.
#[derive(Debug, Clone, Copy)]
struct Attempt {
    scale: f32,
    quality: u8,
}

impl Attempt {
    fn strategy(self) -> OptimizeStrategy {
        if self.scale < 1.0 {
            OptimizeStrategy::Scaled {
                scale: self.scale,
                quality: self.quality,
            }
        } else {
            OptimizeStrategy::Quality(self.quality)
        }
    }
}

fn attempt_plan() -> Vec<Attempt> {
    QUALITY_STEPS
        .iter()
        .map(|&quality| Attempt { scale: 1.0, quality })
        .chain(SCALE_STEPS.iter().map(|&scale| Attempt {
            scale,
            quality: SCALED_QUALITY,
        }))
        .collect()
}

/// Optimize raw image bytes into a size-bounded JPEG.
///
/// # Arguments
/// * `data` - Encoded image in any format the `image` crate can decode
/// * `options` - Budget, dimension cap and background
///
/// # Errors
/// [`ImageError::InvalidOptions`] when `max_dimension_px` is 0, and
/// [`ImageError::Decode`] when `data` is not a parseable image. No other
/// failure is surfaced.
pub fn optimize(data: &[u8], options: &OptimizeOptions) -> Result<OptimizedImage> {
    if options.max_dimension_px == 0 {
        return Err(ImageError::InvalidOptions("max_dimension_px must be positive".into()));
    }
    let decoded = image::load_from_memory(data).map_err(|e| ImageError::Decode(e.to_string()))?;
    let (source_width, source_height) = (decoded.width(), decoded.height());

    let base = cap_dimensions(flatten_alpha(&decoded, options.background), options.max_dimension_px);
    drop(decoded);

    let budget = options.max_size_bytes();
    let mut scaled: Option<(u32, RgbImage)> = None;

    for attempt in attempt_plan() {
        let image = if attempt.scale < 1.0 {
            let key = attempt.scale.to_bits();
            if scaled.as_ref().map(|(k, _)| *k) != Some(key) {
                scaled = Some((key, scale_image(&base, attempt.scale)));
            }
            scaled.as_ref().map_or(&base, |(_, img)| img)
        } else {
            &base
        };

        match encode_jpeg(image, attempt.quality) {
            Ok(bytes) => {
                tracing::debug!(
                    scale = attempt.scale,
                    quality = attempt.quality,
                    size_bytes = bytes.len(),
                    budget_bytes = budget,
                    "JPEG attempt encoded"
                );
                if bytes.len() <= budget {
                    return Ok(OptimizedImage {
                        bytes,
                        width: image.width(),
                        height: image.height(),
                        strategy: attempt.strategy(),
                    });
                }
            }
            Err(e) => {
                tracing::warn!(
                    scale = attempt.scale,
                    quality = attempt.quality,
                    error = %e,
                    "JPEG attempt failed, trying next"
                );
            }
        }
    }

    let (floor_scale, floor_image) = match &scaled {
        Some((key, img)) => (f32::from_bits(*key), img),
        None => (1.0, &base),
    };

    match encode_jpeg(floor_image, FLOOR_QUALITY) {
        Ok(bytes) => {
            tracing::debug!(size_bytes = bytes.len(), budget_bytes = budget, "Budget not met, using quality floor");
            Ok(OptimizedImage {
                bytes,
                width: floor_image.width(),
                height: floor_image.height(),
                strategy: OptimizeStrategy::Floor {
                    scale: floor_scale,
                    quality: FLOOR_QUALITY,
                },
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "Optimization failed after decode, keeping original bytes");
            Ok(OptimizedImage {
                bytes: data.to_vec(),
                width: source_width,
                height: source_height,
                strategy: OptimizeStrategy::Passthrough,
            })
        }
    }
}

/// Encode an RGB image as baseline JPEG.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buffer)
}
