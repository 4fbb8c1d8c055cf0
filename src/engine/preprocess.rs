//! Image preprocessing for the cell classifier
//!
//! Every image, at training and at inference time, goes through the same
//! transform: decode, grayscale, resize, normalize, flatten.

use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use ndarray::Array1;

/// Side length of the square classifier input
pub const CLASSIFIER_INPUT_SIZE: u32 = 128;

/// Decode image from bytes, format sniffed from the content
///
/// Pixels are taken as stored; EXIF orientation tags are not applied.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(data)?)
}

/// Convert to 8-bit grayscale with ITU-R 601-2 luma weights
///
/// `L = R * 299/1000 + G * 587/1000 + B * 114/1000`, evaluated in 16-bit
/// fixed point and rounded, as PIL's "L" conversion does.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut gray: GrayImage = ImageBuffer::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (r, g, b) = (pixel[0] as u32, pixel[1] as u32, pixel[2] as u32);
        let luma = (r * 19595 + g * 38470 + b * 7471 + 0x8000) >> 16;
        gray.put_pixel(x, y, Luma([luma as u8]));
    }

    gray
}

/// Turn a decoded image into a flattened feature vector
///
/// Grayscale, resized to exactly `size x size` (aspect ratio is not kept),
/// scaled to `[0, 1]` and flattened row-major.
pub fn to_feature_vector(image: &DynamicImage, size: u32) -> Array1<f32> {
    let gray = DynamicImage::ImageLuma8(to_grayscale(image));
    let resized = gray
        .resize_exact(size, size, image::imageops::FilterType::CatmullRom)
        .to_luma8();

    resized.pixels().map(|p| p[0] as f32 / 255.0).collect()
}

/// Decode raw upload bytes straight into a feature vector
pub fn features_from_bytes(data: &[u8], size: u32) -> Result<Array1<f32>> {
    let image = decode_image(data)?;
    Ok(to_feature_vector(&image, size))
}

/// Read an image file from disk into a feature vector
pub fn features_from_path(path: &Path, size: u32) -> Result<Array1<f32>> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    features_from_bytes(&data, size)
        .with_context(|| format!("Failed to decode image {}", path.display()))
}
