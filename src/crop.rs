//! Document capture/crop rasterization.
//!
//! The wizard previews a selected photo at some on-screen size and lets the
//! agent pick a rectangular region plus a quarter-turn rotation. This module
//! turns that selection into the final JPEG blob: region coordinates arrive in
//! the *displayed* space and are scaled back into the image's natural
//! resolution, so the output is full-resolution regardless of preview zoom.
//!
//! Also hosts the optional server-side re-encode hook used by the upload
//! pipeline to normalize size and strip metadata from incoming files.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use thiserror::Error;

/// Fixed output quality for cropped documents and the re-encode hook.
pub const JPEG_QUALITY: u8 = 95;

/// Crop rectangle in displayed (preview) coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A confirmed crop: the region, the preview dimensions it was picked in, and
/// a quarter-turn rotation. The region addresses the rotated preview, so
/// rotation is applied to the source before the region is cut.
#[derive(Debug, Clone, Copy)]
pub struct CropSelection {
    pub region: CropRegion,
    pub displayed_width: f32,
    pub displayed_height: f32,
    /// Degrees, multiple of 90, wrapping at +/-360.
    pub rotation_deg: i32,
}

#[derive(Debug, Error)]
pub enum CropError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),
    #[error("crop region is empty")]
    EmptyRegion,
    #[error("displayed dimensions must be positive")]
    BadDisplaySize,
}

/// Collapse any multiple of 90 into {0, 90, 180, 270}; -270 and 450 both
/// land on 90.
pub fn normalize_rotation(deg: i32) -> Result<u32, CropError> {
    if deg % 90 != 0 {
        return Err(CropError::InvalidRotation(deg));
    }
    Ok(deg.rem_euclid(360) as u32)
}

/// Rasterize a confirmed crop into a JPEG blob.
///
/// Output pixel dimensions are `round(w * sx) x round(h * sy)` where
/// `sx = natural_width / displayed_width` (and analogously for height) of the
/// rotated source. The output stays the scaled crop size, never a
/// rotation-adjusted bounding box. Encoding is JPEG quality 95, RGB.
pub fn render_crop(source: &[u8], selection: &CropSelection) -> Result<Vec<u8>, CropError> {
    if selection.displayed_width <= 0.0 || selection.displayed_height <= 0.0 {
        return Err(CropError::BadDisplaySize);
    }
    let region = selection.region;
    if region.width <= 0.0 || region.height <= 0.0 {
        return Err(CropError::EmptyRegion);
    }

    let img = image::load_from_memory(source)?;
    let rotated = match normalize_rotation(selection.rotation_deg)? {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img,
    };

    // Scale the displayed-space region into natural pixels; this corrects for
    // any on-screen downscaling of the preview.
    let sx = rotated.width() as f32 / selection.displayed_width;
    let sy = rotated.height() as f32 / selection.displayed_height;

    let out_w = (region.width * sx).round() as u32;
    let out_h = (region.height * sy).round() as u32;
    if out_w == 0 || out_h == 0 {
        return Err(CropError::EmptyRegion);
    }
    let out_w = out_w.min(rotated.width());
    let out_h = out_h.min(rotated.height());

    let x = ((region.x * sx).round().max(0.0) as u32).min(rotated.width() - out_w);
    let y = ((region.y * sy).round().max(0.0) as u32).min(rotated.height() - out_h);

    let cropped = rotated.crop_imm(x, y, out_w, out_h);
    encode_jpeg(&cropped)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, CropError> {
    // JPEG carries no alpha channel; flatten to RGB before encoding.
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), JPEG_QUALITY);
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(buf)
}

/// Best-effort upload normalization: PNG is kept lossless, everything else is
/// re-encoded to JPEG quality 95. Returns the bytes plus the resulting
/// content type. Anything that fails to decode passes through untouched; the
/// pipeline never depends on this hook for correctness.
pub fn normalize_upload(bytes: &[u8], content_type: &str) -> (Vec<u8>, String) {
    let decoded = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(_) => return (bytes.to_vec(), content_type.to_string()),
    };

    if content_type == "image/png" {
        let rgba = decoded.to_rgba8();
        let mut buf = Vec::new();
        let encoder = PngEncoder::new(Cursor::new(&mut buf));
        match encoder.write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        ) {
            Ok(()) => (buf, "image/png".to_string()),
            Err(_) => (bytes.to_vec(), content_type.to_string()),
        }
    } else {
        match encode_jpeg(&decoded) {
            Ok(buf) => (buf, "image/jpeg".to_string()),
            Err(_) => (bytes.to_vec(), content_type.to_string()),
        }
    }
}
