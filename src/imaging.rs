//! Image decode/encode and the primitive operations the compositor uses.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};

use crate::error::MixResult;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub fn decode(bytes: &[u8]) -> MixResult<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> MixResult<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(image.clone()).write_with_encoder(encoder)?;
    Ok(buf)
}

pub fn dimensions(bytes: &[u8]) -> MixResult<(u32, u32)> {
    Ok(decode(bytes)?.dimensions())
}

pub fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width.max(1), height.max(1), FilterType::Lanczos3)
}

/// Paste `overlay` onto `base` with its top-left corner at `(x, y)`. Pixels
/// falling outside `base` are dropped.
pub fn paste(base: &mut RgbImage, overlay: &RgbImage, x: u32, y: u32) {
    imageops::overlay(base, overlay, i64::from(x), i64::from(y));
}

/// Sub-image copy; `x2`/`y2` exclusive and clamped to the image.
pub fn cut(image: &RgbImage, x1: u32, y1: u32, x2: u32, y2: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let (x2, y2) = (x2.min(w), y2.min(h));
    let (x1, y1) = (x1.min(x2), y1.min(y2));
    imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image()
}

/// Write `images` next to `target` as `<stem>_<i>.jpg`.
pub fn save_numbered(images: &[Vec<u8>], target: &Path) -> MixResult<Vec<PathBuf>> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "mix".to_string());

    let mut paths = Vec::with_capacity(images.len());
    for (i, bytes) in images.iter().enumerate() {
        let path = parent.join(format!("{stem}_{i}.jpg"));
        std::fs::write(&path, bytes)?;
        paths.push(path);
    }
    Ok(paths)
}
