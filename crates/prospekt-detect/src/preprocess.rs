//! Letterbox preprocessing.
//!
//! The page is resized preserving aspect ratio so its longer edge equals the
//! model input size, centred on a grey (114) square canvas, converted to RGB
//! and laid out NCHW with values in `[0, 1]`. [`Letterbox`] captures the
//! transform so postprocessing can invert it from the two image sizes alone.

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use prospekt_core::BoundingBox;

use crate::error::DetectError;

const PAD_VALUE: u8 = 114;

/// Geometry of the letterbox transform between an original page and the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub input_size: u32,
    pub scale: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn new(original_width: u32, original_height: u32, input_size: u32) -> Self {
        let longest = original_width.max(original_height).max(1);
        let scale = input_size as f32 / longest as f32;
        let resized = |edge: u32| ((edge as f32 * scale).round() as u32).clamp(1, input_size);
        let resized_width = resized(original_width);
        let resized_height = resized(original_height);
        Self {
            input_size,
            scale,
            resized_width,
            resized_height,
            pad_x: (input_size - resized_width) / 2,
            pad_y: (input_size - resized_height) / 2,
        }
    }

    /// Maps a box from model-input pixels back to original-image pixels,
    /// clamped to the original image bounds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_original(
        &self,
        bbox: &BoundingBox,
        original_width: u32,
        original_height: u32,
    ) -> BoundingBox {
        let max_x = original_width as f32;
        let max_y = original_height as f32;
        let x = |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0.0, max_x);
        let y = |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0.0, max_y);
        BoundingBox {
            x1: x(bbox.x1),
            y1: y(bbox.y1),
            x2: x(bbox.x2),
            y2: y(bbox.y2),
        }
    }
}

/// Fixed-size model input for one page, plus the original page size.
#[derive(Debug, Clone)]
pub struct ModelInput {
    /// Shape `[1, 3, input_size, input_size]`, standard layout.
    pub tensor: Array4<f32>,
    pub input_size: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl ModelInput {
    #[must_use]
    pub fn letterbox(&self) -> Letterbox {
        Letterbox::new(self.original_width, self.original_height, self.input_size)
    }

    /// Contiguous NCHW data.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Inference`] if the tensor is not in standard layout.
    pub fn as_slice(&self) -> Result<&[f32], DetectError> {
        self.tensor
            .as_slice()
            .ok_or_else(|| DetectError::Inference("model input is not contiguous".to_string()))
    }

    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        let s = self.input_size as usize;
        [1, 3, s, s]
    }
}

/// Decodes raw page bytes and prepares the model input.
///
/// # Errors
///
/// Returns [`DetectError::UnsupportedImageFormat`] if the bytes are not a decodable image.
pub fn prepare(bytes: &[u8], input_size: u32) -> Result<ModelInput, DetectError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| DetectError::UnsupportedImageFormat(e.to_string()))?;
    Ok(prepare_image(&img, input_size))
}

#[must_use]
pub fn prepare_image(img: &DynamicImage, input_size: u32) -> ModelInput {
    let rgb = img.to_rgb8();
    let (original_width, original_height) = rgb.dimensions();
    let letterbox = Letterbox::new(original_width, original_height, input_size);

    let resized = image::imageops::resize(
        &rgb,
        letterbox.resized_width,
        letterbox.resized_height,
        FilterType::Triangle,
    );

    let size = input_size as usize;
    let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), f32::from(PAD_VALUE) / 255.0);
    let (pad_x, pad_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = f32::from(pixel[c]) / 255.0;
        }
    }

    ModelInput {
        tensor,
        input_size,
        original_width,
        original_height,
    }
}
