// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the BLIP vision encoder

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Target size for the BLIP vision encoder
pub const BLIP_INPUT_SIZE: u32 = 384;

/// CLIP normalization mean values (BLIP reuses the OpenAI CLIP statistics)
pub const MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std values
pub const STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Preprocess an image for the BLIP encoder
///
/// Steps:
/// 1. Convert to RGB
/// 2. Resize to BLIP_INPUT_SIZE x BLIP_INPUT_SIZE with bicubic filtering
///    (aspect ratio is not kept, matching the reference processor)
/// 3. Normalize: (pixel/255 - mean) / std
/// 4. Convert to NCHW tensor format [1, 3, H, W]
pub fn preprocess_for_blip(image: &DynamicImage) -> Array4<f32> {
    preprocess_with_size(image, BLIP_INPUT_SIZE)
}

/// Preprocess to an arbitrary square size
pub fn preprocess_with_size(image: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = if image.width() == size && image.height() == size {
        image.to_rgb8()
    } else {
        image
            .resize_exact(size, size, FilterType::CatmullRom)
            .to_rgb8()
    };

    let side = size as usize;
    let mut tensor = Array4::zeros((1, 3, side, side));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let normalized = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
            tensor[[0, c, y as usize, x as usize]] = normalized;
        }
    }

    tensor
}
