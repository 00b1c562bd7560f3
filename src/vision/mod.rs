// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing module for image captioning
//!
//! This module provides:
//! - Upload decoding and validation (`image_utils`)
//! - BLIP captioning on CPU via ONNX Runtime (`blip`)
//! - Captioning through a hosted OpenAI-compatible API (`hosted`)
//! - The lazily loaded, shared model handle (`model_manager`)

pub mod blip;
pub mod hosted;
pub mod image_utils;
pub mod model_manager;
pub mod provider;

pub use hosted::HostedCaptioner;
pub use image_utils::{decode_image_bytes, detect_format, DecodedImage, ImageError, ImageInfo};
pub use model_manager::{ModelHandle, ModelSource, SharedProvider};
pub use provider::{CaptionProvider, GenerationOptions};
