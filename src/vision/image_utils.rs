// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading and utility functions for caption uploads

use image::{ColorType, DynamicImage, ImageFormat};
use thiserror::Error;

/// Maximum image size (10MB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Custom error types for image processing
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("Unsupported image format (expected PNG or JPEG)")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Image data is empty")]
    EmptyData,
}

/// Image information extracted during loading
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected format
    pub format: ImageFormat,
    /// Color mode of the source pixels (PIL naming: RGB, RGBA, L, ...)
    pub color_mode: &'static str,
    /// Size in bytes
    pub size_bytes: usize,
}

impl ImageInfo {
    /// Upper-case format name for display ("PNG", "JPEG")
    pub fn format_name(&self) -> &'static str {
        format_to_name(self.format)
    }
}

/// An uploaded image, immutable once decoded
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    info: ImageInfo,
}

impl DecodedImage {
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// The bitmap converted to 8-bit RGB, the form the caption model consumes
    pub fn to_rgb(&self) -> DynamicImage {
        match &self.image {
            DynamicImage::ImageRgb8(_) => self.image.clone(),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        }
    }
}

/// Decode raw image bytes (for multipart uploads)
///
/// Only PNG and JPEG are accepted. The format is taken from the magic
/// bytes, never from the file name.
///
/// # Errors
/// * `EmptyData` - no bytes
/// * `TooLarge` - more than `max_size` bytes
/// * `UnsupportedFormat` - not a PNG or JPEG signature
/// * `DecodeFailed` - signature matched but the data is corrupt
pub fn decode_image_bytes(bytes: Vec<u8>, max_size: usize) -> Result<DecodedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    if bytes.len() > max_size {
        return Err(ImageError::TooLarge(bytes.len(), max_size));
    }

    let format = detect_format(&bytes)?;

    let image = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    let info = ImageInfo {
        width: image.width(),
        height: image.height(),
        format,
        color_mode: color_mode(image.color()),
        size_bytes: bytes.len(),
    };

    Ok(DecodedImage { image, info })
}

/// Detect image format from magic bytes
///
/// # Returns
/// * `Ok(ImageFormat)` - PNG or JPEG
/// * `Err(ImageError::UnsupportedFormat)` - anything else
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    match bytes {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        _ => Err(ImageError::UnsupportedFormat),
    }
}

/// Check a multipart content type against the accepted MIME types
pub fn is_supported_mime(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(mime.as_str(), "image/png" | "image/jpeg" | "image/jpg")
}

/// Get the format display name
pub fn format_to_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "PNG",
        ImageFormat::Jpeg => "JPEG",
        _ => "UNKNOWN",
    }
}

/// Map the decoded color type to a PIL-style mode string
pub fn color_mode(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;F",
        ColorType::Rgba32F => "RGBA;F",
        _ => "unknown",
    }
}
