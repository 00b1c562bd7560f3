// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption provider abstraction
//!
//! A provider maps an RGB bitmap plus decoding parameters to a caption.
//! The local BLIP pipeline and the hosted client both implement it.

use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Smallest accepted caption length bound
pub const MIN_CAPTION_LENGTH: usize = 20;

/// Largest accepted caption length bound
pub const MAX_CAPTION_LENGTH: usize = 100;

/// Length bound used when the client sends none
pub const DEFAULT_CAPTION_LENGTH: usize = 50;

/// Beam width used for every caption
pub const DEFAULT_NUM_BEAMS: usize = 5;

/// Decoding parameters passed to the provider
///
/// `max_length` and `min_length` are token counts and act as hints to
/// the decoder, not as a character cap on the returned text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_length: usize,
    pub min_length: usize,
    pub num_beams: usize,
    pub early_stopping: bool,
    pub no_repeat_ngram_size: usize,
    pub length_penalty: f32,
}

impl GenerationOptions {
    /// Options for a caption length bound
    ///
    /// `min_length` is half the bound but never below 5, which pushes the
    /// model toward fuller sentences.
    pub fn for_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            min_length: (max_length / 2).max(5),
            num_beams: DEFAULT_NUM_BEAMS,
            early_stopping: true,
            no_repeat_ngram_size: 2,
            length_penalty: 1.0,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::for_max_length(DEFAULT_CAPTION_LENGTH)
    }
}

/// Anything that can turn an image into a caption
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    /// Model identifier reported in responses
    fn name(&self) -> &str;

    /// Generate a caption for an RGB image
    async fn caption(&self, image: &DynamicImage, options: &GenerationOptions) -> Result<String>;
}
