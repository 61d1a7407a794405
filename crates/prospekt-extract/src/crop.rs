//! JPEG crops of product groups, cut from the original page image.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use prospekt_core::{BoundingBox, PageResult};

use crate::error::ExtractError;

const JPEG_QUALITY: u8 = 90;

/// Union of the detection boxes of product group `group`, or `None` when the
/// group does not exist or references no detection.
#[must_use]
pub fn group_bounds(page: &PageResult, group: usize) -> Option<BoundingBox> {
    page.products
        .get(group)?
        .detections
        .iter()
        .filter_map(|&index| page.detections.get(index))
        .map(|detection| detection.bbox)
        .reduce(|a, b| BoundingBox {
            x1: a.x1.min(b.x1),
            y1: a.y1.min(b.y1),
            x2: a.x2.max(b.x2),
            y2: a.y2.max(b.y2),
        })
}

/// Decodes the page once and returns one JPEG crop per product group, in
/// group order. Groups covering less than one pixel yield `None`.
///
/// Blocking; call from a blocking thread.
///
/// # Errors
///
/// Returns [`ExtractError::Crop`] if the page bytes cannot be decoded or a
/// crop cannot be encoded.
pub fn crop_groups(
    page_bytes: &[u8],
    page: &PageResult,
) -> Result<Vec<Option<Vec<u8>>>, ExtractError> {
    let decoded =
        image::load_from_memory(page_bytes).map_err(|e| ExtractError::Crop(e.to_string()))?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    (0..page.products.len())
        .map(|group| {
            let Some(rect) = group_bounds(page, group)
                .and_then(|bounds| pixel_rect(&bounds, rgb.width(), rgb.height()))
            else {
                return Ok(None);
            };
            let (x, y, width, height) = rect;
            encode_jpeg(&rgb.crop_imm(x, y, width, height)).map(Some)
        })
        .collect()
}

/// Whole-pixel rectangle `(x, y, width, height)` enclosing `bounds`, clipped
/// to the image.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn pixel_rect(bounds: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clip = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;
    let x1 = clip(bounds.x1.floor(), width);
    let y1 = clip(bounds.y1.floor(), height);
    let x2 = clip(bounds.x2.ceil(), width);
    let y2 = clip(bounds.y2.ceil(), height);
    (x2 > x1 && y2 > y1).then(|| (x1, y1, x2 - x1, y2 - y1))
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| ExtractError::Crop(e.to_string()))?;
    Ok(buf)
}
