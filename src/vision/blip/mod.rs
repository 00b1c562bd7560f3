// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! BLIP integration for image captioning
//!
//! This module provides CPU-based captioning with an ONNX export of
//! `Salesforce/blip-image-captioning-base`.
//!
//! Components:
//! - `encoder` - Vision encoder for image feature extraction
//! - `decoder` - Text decoder scoring next tokens
//! - `beam_search` - Decoding loop over decoder logits
//! - `model` - Combined BLIP pipeline
//! - `preprocessing` - Image preprocessing for encoder input

pub mod beam_search;
pub mod decoder;
pub mod encoder;
pub mod model;
pub mod preprocessing;

pub use decoder::{BlipTextDecoder, SpecialTokens};
pub use encoder::BlipVisionEncoder;
pub use model::{BlipModel, BlipModelFiles};

use anyhow::{Context, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;

/// File names tried for the vision encoder, in order
pub const VISION_ENCODER_FILES: &[&str] = &[
    "vision_model.onnx",
    "vision_encoder.onnx",
    "encoder.onnx",
];

/// File names tried for the text decoder, in order
pub const TEXT_DECODER_FILES: &[&str] = &[
    "text_decoder_model.onnx",
    "decoder_model.onnx",
    "decoder.onnx",
];

pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Intra-op threads for every captioning session
const INTRA_THREADS: usize = 4;

/// Build a CPU-only ONNX Runtime session
pub(crate) fn load_cpu_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(INTRA_THREADS)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))
}
