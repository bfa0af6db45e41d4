//! Bitmap → brightness grid conversion.
//!
//! ## Rust concepts
//! - Borrowing an image (`&DynamicImage`) instead of taking ownership
//! - `image::imageops` for resampling
//! - Float math with explicit clamping before narrowing casts

use crate::shapes;
use crate::{Color, Grid};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

/// Contrast value that leaves luma unchanged.
pub const NEUTRAL_CONTRAST: u8 = 100;
/// Highest accepted contrast (2× stretch around mid-gray).
pub const MAX_CONTRAST: u8 = 200;

/// Resample `image` to exactly `width`×`height` and reduce each cell to a
/// brightness value.
///
/// Per cell: BT.709 luma, then contrast around 128
/// (`(luma - 128) * contrast / 100 + 128`), then brightness scaling
/// (`luma * brightness / 255`), clamped to 0..=255 and truncated.
/// A zero-sized target yields an empty grid; a zero-sized source yields an
/// all-off grid of the target size.
pub fn convert(image: &DynamicImage, width: u32, height: u32, brightness: u8, contrast: u8) -> Grid {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    if image.width() == 0 || image.height() == 0 {
        return shapes::clear(width, height);
    }

    let resized = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();
    let contrast = contrast.min(MAX_CONTRAST) as f32 / NEUTRAL_CONTRAST as f32;
    let brightness = brightness as f32 / 255.0;

    resized
        .pixels()
        .map(|p| {
            let luma = Color::new(p[0], p[1], p[2]).luma();
            let luma = (luma - 128.0) * contrast + 128.0;
            let luma = luma * brightness;
            luma.clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Built-in demo picture: a hue ring around a white dot on black.
///
/// Used by the SHOW_SAMPLE_IMAGE command so the full image path can be
/// exercised without any album art.
pub fn sample_image(size: u32) -> RgbImage {
    let size = size.max(1);
    let center = (size as f32 - 1.0) / 2.0;
    let outer = size as f32 / 2.0;
    let inner = outer * 0.55;
    let dot = outer * 0.18;

    RgbImage::from_fn(size, size, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist <= dot {
            Rgb([255, 255, 255])
        } else if dist >= inner && dist <= outer {
            let angle = dy.atan2(dx).to_degrees().rem_euclid(360.0);
            let c = Color::from_hue(angle as u16);
            Rgb([c.r, c.g, c.b])
        } else {
            Rgb([0, 0, 0])
        }
    })
}
