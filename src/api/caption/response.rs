// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption response types

use serde::{Deserialize, Serialize};

use crate::caption::{caption_file_name, CaptionResult};
use crate::vision::image_utils::ImageInfo;

/// Uploaded image metadata shown next to the caption
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub width: u32,
    pub height: u32,
    /// "PNG" or "JPEG"
    pub format: String,
    /// Color mode (RGB, RGBA, L, ...)
    pub mode: String,
    pub size_bytes: usize,
}

impl From<&ImageInfo> for ImageSummary {
    fn from(info: &ImageInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            format: info.format_name().to_string(),
            mode: info.color_mode.to_string(),
            size_bytes: info.size_bytes,
        }
    }
}

/// Response from image captioning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionResponse {
    /// Generated caption text
    pub caption: String,
    /// Name of the uploaded file
    pub file_name: String,
    /// Suggested name for the downloadable caption file
    pub download_name: String,
    pub image: ImageSummary,
    pub max_length: usize,
    /// Model used for captioning
    pub model: String,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl CaptionResponse {
    pub fn new(result: CaptionResult, file_name: &str) -> Self {
        Self {
            download_name: caption_file_name(file_name),
            file_name: file_name.to_string(),
            image: ImageSummary::from(&result.image),
            caption: result.caption,
            max_length: result.max_length,
            model: result.model,
            processing_time_ms: result.processing_time_ms,
        }
    }
}
