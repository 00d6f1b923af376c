//! Dimension math and resampling.

use image::{imageops::FilterType, RgbImage};

/// Resampling filter for every downscale the optimizer performs.
pub const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

/// Fit `width`×`height` inside a `max_dimension` square, preserving aspect
/// ratio.
///
/// Images already within bounds are returned unchanged (never upscaled);
/// otherwise the larger side becomes exactly `max_dimension`. A
/// `max_dimension` of 0 means no bound; [`optimize`](crate::optimize)
/// rejects it before getting here.
///
/// # Example
/// ```
/// use qrshare_image::fit_within;
///
/// assert_eq!(fit_within(5000, 4000, 1920), (1920, 1536));
/// assert_eq!(fit_within(800, 600, 1920), (800, 600));
/// ```
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return (width, height);
    }

    let scale_side = |side: u32, longest: u32| {
        ((f64::from(side) * f64::from(max_dimension) / f64::from(longest)).round() as u32).max(1)
    };

    if width >= height {
        (max_dimension, scale_side(height, width))
    } else {
        (scale_side(width, height), max_dimension)
    }
}

/// Scale both sides by `factor`, rounding and keeping at least one pixel.
pub fn scale_dimensions(width: u32, height: u32, factor: f32) -> (u32, u32) {
    let scale = |side: u32| ((f64::from(side) * f64::from(factor)).round() as u32).max(1);
    (scale(width), scale(height))
}

/// Downscale an image so neither side exceeds `max_dimension`.
pub fn cap_dimensions(img: RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = fit_within(img.width(), img.height(), max_dimension);
    if (width, height) == img.dimensions() {
        return img;
    }
    image::imageops::resize(&img, width, height, RESAMPLE_FILTER)
}

/// Resample an image by a scale factor.
pub fn scale_image(img: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = scale_dimensions(img.width(), img.height(), factor);
    image::imageops::resize(img, width, height, RESAMPLE_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fit_landscape() {
        assert_eq!(fit_within(5000, 4000, 1920), (1920, 1536));
    }

    #[test]
    fn test_fit_portrait() {
        assert_eq!(fit_within(1000, 4000, 1920), (480, 1920));
    }

    #[test]
    fn test_fit_no_upscale() {
        assert_eq!(fit_within(500, 400, 1920), (500, 400));
        assert_eq!(fit_within(1920, 1920, 1920), (1920, 1920));
    }

    #[test]
    fn test_fit_zero_bound_is_unbounded() {
        assert_eq!(fit_within(5000, 4000, 0), (5000, 4000));
    }

    #[test]
    fn test_fit_extreme_ratio_keeps_one_pixel() {
        assert_eq!(fit_within(100_000, 1, 1920), (1920, 1));
    }

    #[test]
    fn test_scale_dimensions() {
        assert_eq!(scale_dimensions(1920, 1536, 0.8), (1536, 1229));
        assert_eq!(scale_dimensions(640, 480, 0.4), (256, 192));
        assert_eq!(scale_dimensions(1, 1, 0.4), (1, 1));
    }

    #[test]
    fn test_cap_dimensions_resizes() {
        let img = RgbImage::new(400, 200);
        let capped = cap_dimensions(img, 100);
        assert_eq!(capped.dimensions(), (100, 50));
    }

    proptest! {
        #[test]
        fn fitted_dimensions_stay_in_bounds(w in 1u32..20_000, h in 1u32..20_000, max in 1u32..4096) {
            let (fw, fh) = fit_within(w, h, max);
            prop_assert!(fw <= max && fh <= max);
            prop_assert!(fw >= 1 && fh >= 1);
            prop_assert!(fw <= w && fh <= h);
            if w > max || h > max {
                prop_assert_eq!(fw.max(fh), max);
            }
        }
    }
}
