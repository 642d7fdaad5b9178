//! Image Preprocessing Utilities
//!
//! Encodes decoded images into the tensor layouts the ddddocr models expect:
//! single-channel normalized strips for recognition, and a letterboxed planar
//! RGB canvas for detection.

use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;

use crate::error::{OcrError, OcrResult};
use crate::tensor::Tensor;

/// Grayscale normalization parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeParams {
    /// Mean subtracted after scaling to [0, 1]
    pub mean: f32,
    /// Standard deviation divided out after mean subtraction
    pub std: f32,
}

impl NormalizeParams {
    /// Normalization parameters for custom-trained ddddocr models
    pub const fn ddddocr_custom() -> Self {
        Self {
            mean: 0.456,
            std: 0.224,
        }
    }

    /// Normalization parameters for the official ddddocr model
    pub const fn ddddocr_official() -> Self {
        Self {
            mean: 0.5,
            std: 0.5,
        }
    }

    /// Apply to one 8-bit intensity
    #[inline]
    pub fn apply(&self, value: u8) -> f32 {
        (value as f32 / 255.0 - self.mean) / self.std
    }
}

/// Result of letterboxing an image onto the detection canvas
#[derive(Debug, Clone)]
pub struct Letterbox {
    /// `[1, 3, T, T]` planar RGB tensor, raw 0-255 values
    pub tensor: Tensor,
    /// Scale applied to the source image; divide model coordinates by it
    pub ratio: f32,
    /// Width of the scaled image inside the canvas
    pub resized_width: u32,
    /// Height of the scaled image inside the canvas
    pub resized_height: u32,
}

/// Width of an image scaled to `target_height`, keeping aspect ratio
#[inline]
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u32 {
    let scale = target_height as f64 / height as f64;
    ((width as f64 * scale).round() as u32).max(1)
}

/// Scale image to specified height (for recognition model)
///
/// Scales maintaining aspect ratio
pub fn resize_to_height(img: &DynamicImage, target_height: u32) -> OcrResult<DynamicImage> {
    let (w, h) = img.dimensions();
    ensure_not_empty(w, h)?;

    if h == target_height {
        return Ok(img.clone());
    }

    let new_w = scaled_width(w, h, target_height);
    fast_resize(img, new_w, target_height)
}

/// Fast image resizing using fast_image_resize
///
/// The source is converted to RGB8 first, so the result is always RGB8.
fn fast_resize(img: &DynamicImage, new_w: u32, new_h: u32) -> OcrResult<DynamicImage> {
    use fast_image_resize::{images::Image, PixelType, Resizer};

    let src = match img {
        DynamicImage::ImageRgb8(_) => img.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let mut dst_image = Image::new(new_w, new_h, PixelType::U8x3);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src, &mut dst_image, None)
        .map_err(|e| OcrError::PreprocessError(format!("Image resize failed: {}", e)))?;

    let rgb = RgbImage::from_raw(new_w, new_h, dst_image.into_vec()).ok_or_else(|| {
        OcrError::PreprocessError("Resized buffer does not match target size".to_string())
    })?;
    Ok(DynamicImage::ImageRgb8(rgb))
}

/// Convert image to recognition model input tensor
///
/// Output format: [1, 1, H, W] (NCHW, grayscale)
/// Height is fixed at `target_height`, width scaled proportionally
pub fn preprocess_for_rec(
    img: &DynamicImage,
    target_height: u32,
    params: &NormalizeParams,
) -> OcrResult<Tensor> {
    let resized = resize_to_height(img, target_height)?;
    let gray = resized.to_luma8();
    let (w, h) = (gray.width() as usize, gray.height() as usize);

    let mut input = Array4::<f32>::zeros((1, 1, h, w));
    for (x, y, pixel) in gray.enumerate_pixels() {
        input[[0, 0, y as usize, x as usize]] = params.apply(pixel.0[0]);
    }

    Ok(Tensor::from(input.into_dyn()))
}

/// Letterbox image onto a square detection canvas
///
/// The image is scaled by `min(T/h, T/w)` and placed at the top-left corner of
/// a zero canvas. Output format: [1, 3, T, T] with unnormalized RGB values.
pub fn preprocess_for_det(img: &DynamicImage, target_size: u32) -> OcrResult<Letterbox> {
    let (w, h) = img.dimensions();
    ensure_not_empty(w, h)?;
    if target_size == 0 {
        return Err(OcrError::InvalidParameter(
            "Detection input size must be positive".to_string(),
        ));
    }

    let ratio = (target_size as f64 / h as f64).min(target_size as f64 / w as f64);
    let new_w = ((w as f64 * ratio) as u32).clamp(1, target_size);
    let new_h = ((h as f64 * ratio) as u32).clamp(1, target_size);

    let resized = if (new_w, new_h) == (w, h) {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        fast_resize(img, new_w, new_h)?
    };
    let rgb_img = resized.to_rgb8();

    let size = target_size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in rgb_img.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = r as f32;
        input[[0, 1, y, x]] = g as f32;
        input[[0, 2, y, x]] = b as f32;
    }

    Ok(Letterbox {
        tensor: Tensor::from(input.into_dyn()),
        ratio: ratio as f32,
        resized_width: new_w,
        resized_height: new_h,
    })
}

fn ensure_not_empty(width: u32, height: u32) -> OcrResult<()> {
    if width == 0 || height == 0 {
        return Err(OcrError::PreprocessError(format!(
            "Image has zero size ({}x{})",
            width, height
        )));
    }
    Ok(())
}
