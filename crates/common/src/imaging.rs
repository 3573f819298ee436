//! Image-processing helpers shared by the capture paths
//!
//! Every capture backend ultimately hands its output through here: decode
//! of camera-produced bytes, JPEG re-encode at a caller-chosen quality,
//! and the isotropic downscale used for gallery thumbnails.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, RgbImage};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Thumbnail bounding box (longest edge preserving aspect ratio)
pub const THUMBNAIL_MAX_WIDTH: u32 = 320;
pub const THUMBNAIL_MAX_HEIGHT: u32 = 240;

/// Decode an encoded image (JPEG, PNG, ...) into an RGB8 buffer
pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes).context("failed to decode image data")?;
    Ok(img.to_rgb8())
}

/// Wrap a raw RGB8 pixel buffer as an image
pub fn from_raw_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<RgbImage> {
    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("raw buffer too small for {}x{} RGB frame", width, height))
}

/// Encode an RGB image as JPEG at the given quality (1-100)
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode(
            img.as_raw(),
            img.width(),
            img.height(),
            ExtendedColorType::Rgb8,
        )
        .context("jpeg encoding failed")?;
    Ok(out)
}

/// Downscale so the result fits inside `max_width` x `max_height`,
/// preserving aspect ratio. Images already inside the box are returned
/// unscaled.
pub fn resize_keep_aspect(img: &RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w <= max_width && h <= max_height {
        return img.clone();
    }
    let scale = (f64::from(max_width) / f64::from(w)).min(f64::from(max_height) / f64::from(h));
    let new_w = ((f64::from(w) * scale).round() as u32).max(1);
    let new_h = ((f64::from(h) * scale).round() as u32).max(1);
    image::imageops::resize(img, new_w, new_h, FilterType::Triangle)
}

/// Encode and write an RGB image to `path` as JPEG
pub fn write_image(img: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let bytes = encode_jpeg(img, quality)?;
    fs::write(path, &bytes)
        .with_context(|| format!("failed to write image to {}", path.display()))?;
    debug!(
        file = %path.display(),
        size_bytes = bytes.len(),
        "image written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
    }

    #[test]
    fn encode_decode_round_trip() {
        let img = gradient(64, 48);
        let bytes = encode_jpeg(&img, 90).unwrap();
        assert_eq!(&bytes[..2], &[0xff, 0xd8], "JPEG SOI marker");
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn resize_preserves_aspect_ratio() {
        let img = gradient(1280, 720);
        let thumb = resize_keep_aspect(&img, THUMBNAIL_MAX_WIDTH, THUMBNAIL_MAX_HEIGHT);
        // 1280x720 into 320x240 is limited by width: 320x180
        assert_eq!(thumb.dimensions(), (320, 180));
    }

    #[test]
    fn resize_is_noop_inside_bounds() {
        let img = gradient(100, 80);
        let out = resize_keep_aspect(&img, 320, 240);
        assert_eq!(out.dimensions(), (100, 80));
    }

    #[test]
    fn portrait_resize_limited_by_height() {
        let img = gradient(720, 1280);
        let thumb = resize_keep_aspect(&img, 320, 240);
        assert_eq!(thumb.dimensions(), (135, 240));
    }

    #[test]
    fn from_raw_rejects_short_buffer() {
        assert!(from_raw_rgb(10, 10, vec![0u8; 10]).is_err());
    }
}
