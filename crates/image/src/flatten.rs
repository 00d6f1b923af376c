//! Alpha flattening onto an opaque background.

use image::{DynamicImage, Rgb, RgbImage, Rgba};

/// Background used when flattening transparent uploads.
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Composite an image over a solid background, producing opaque RGB.
///
/// Images without an alpha channel are converted directly. Palette images
/// are already expanded to RGBA by the decoder, so they take the blending
/// path as well.
pub fn flatten_alpha(img: &DynamicImage, background: [u8; 3]) -> RgbImage {
    if !has_alpha_channel(img) {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut output = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = f32::from(a) / 255.0;
        let blend = |c: u8, bg: u8| {
            (f32::from(c) * alpha + f32::from(bg) * (1.0 - alpha)).round() as u8
        };

        output.put_pixel(
            x,
            y,
            Rgb([blend(r, background[0]), blend(g, background[1]), blend(b, background[2])]),
        );
    }

    output
}

/// Check if an image has an alpha channel
pub fn has_alpha_channel(img: &DynamicImage) -> bool {
    img.color().has_alpha()
}
