// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption service errors

use thiserror::Error;

use crate::vision::image_utils::ImageError;

/// Failures of a single caption request
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("max_length must be between {min} and {max}, got {value}")]
    InvalidLength { value: usize, min: usize, max: usize },

    #[error(transparent)]
    Decode(#[from] ImageError),

    #[error("Caption model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Caption generation failed: {0}")]
    Generation(String),

    #[error("Model produced an empty caption")]
    EmptyCaption,
}

impl CaptionError {
    /// Whether the request itself was at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidLength { .. } | Self::Decode(_))
    }
}
