// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption generation service

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::errors::CaptionError;
use crate::vision::image_utils::{decode_image_bytes, ImageInfo};
use crate::vision::model_manager::ModelHandle;
use crate::vision::provider::{GenerationOptions, MAX_CAPTION_LENGTH, MIN_CAPTION_LENGTH};

/// Outcome of a successful caption request
#[derive(Debug, Clone)]
pub struct CaptionResult {
    pub caption: String,
    /// Name of the provider that produced the caption
    pub model: String,
    pub max_length: usize,
    pub processing_time_ms: u64,
    pub image: ImageInfo,
}

/// Stateless captioning over a shared model handle
#[derive(Debug, Clone)]
pub struct CaptionService {
    handle: Arc<ModelHandle>,
    max_upload_bytes: usize,
}

impl CaptionService {
    pub fn new(handle: Arc<ModelHandle>, max_upload_bytes: usize) -> Self {
        Self {
            handle,
            max_upload_bytes,
        }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Caption an uploaded image
    ///
    /// # Process
    /// 1. Check the length bound
    /// 2. Decode the upload (PNG/JPEG)
    /// 3. Acquire the shared provider, loading it on first use
    /// 4. Generate with beam-search options derived from `max_length`
    /// 5. Reject blank output
    pub async fn generate_caption(
        &self,
        bytes: Vec<u8>,
        max_length: usize,
    ) -> Result<CaptionResult, CaptionError> {
        let start = Instant::now();

        if !(MIN_CAPTION_LENGTH..=MAX_CAPTION_LENGTH).contains(&max_length) {
            return Err(CaptionError::InvalidLength {
                value: max_length,
                min: MIN_CAPTION_LENGTH,
                max: MAX_CAPTION_LENGTH,
            });
        }

        let decoded = decode_image_bytes(bytes, self.max_upload_bytes)?;
        let info = decoded.info().clone();
        debug!(
            "Decoded {} {}x{} ({}, {} bytes)",
            info.format_name(),
            info.width,
            info.height,
            info.color_mode,
            info.size_bytes
        );

        let provider = self
            .handle
            .get_or_load()
            .await
            .map_err(|e| CaptionError::ModelUnavailable(format!("{:#}", e)))?;

        let options = GenerationOptions::for_max_length(max_length);
        let rgb = decoded.to_rgb();
        let caption = provider.caption(&rgb, &options).await.map_err(|e| {
            warn!("Caption generation failed: {:#}", e);
            CaptionError::Generation(format!("{:#}", e))
        })?;

        let caption = caption.trim().to_string();
        if caption.is_empty() {
            return Err(CaptionError::EmptyCaption);
        }

        let processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Captioned {}x{} {} in {}ms with {}",
            info.width,
            info.height,
            info.format_name(),
            processing_time_ms,
            provider.name()
        );

        Ok(CaptionResult {
            caption,
            model: provider.name().to_string(),
            max_length,
            processing_time_ms,
            image: info,
        })
    }
}

/// Name of the downloadable caption file for an upload
///
/// `photo.beach.jpg` becomes `caption_photo.txt`; directory components
/// and quotes are dropped, and an empty stem falls back to `image`.
pub fn caption_file_name(upload_name: &str) -> String {
    let base = upload_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let stem: String = base
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect();
    let stem = stem.trim();
    let stem = if stem.is_empty() { "image" } else { stem };
    format!("caption_{}.txt", stem)
}
