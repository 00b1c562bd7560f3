// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! BLIP model wrapper for image captioning
//!
//! Combines the vision encoder, the text decoder and beam search.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::beam_search::beam_search;
use super::decoder::BlipTextDecoder;
use super::encoder::BlipVisionEncoder;
use super::preprocessing::preprocess_for_blip;
use super::{TEXT_DECODER_FILES, TOKENIZER_FILE, VISION_ENCODER_FILES};
use crate::vision::provider::{CaptionProvider, GenerationOptions};

/// Model name reported in responses
pub const BLIP_MODEL_NAME: &str = "blip-image-captioning-base";

/// Resolved paths of the three files a BLIP pipeline needs
#[derive(Debug, Clone, PartialEq)]
pub struct BlipModelFiles {
    pub vision_encoder: PathBuf,
    pub text_decoder: PathBuf,
    pub tokenizer: PathBuf,
}

impl BlipModelFiles {
    /// Locate model files in a directory
    ///
    /// Each file is looked up directly in `dir` and then in `dir/onnx`.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            anyhow::bail!("BLIP model directory not found: {}", dir.display());
        }

        Ok(Self {
            vision_encoder: find_model_file(dir, VISION_ENCODER_FILES)?,
            text_decoder: find_model_file(dir, TEXT_DECODER_FILES)?,
            tokenizer: find_model_file(dir, &[TOKENIZER_FILE])?,
        })
    }
}

/// Find a model file by trying multiple possible names
fn find_model_file(dir: &Path, names: &[&str]) -> Result<PathBuf> {
    for base in [dir.to_path_buf(), dir.join("onnx")] {
        for name in names {
            let path = base.join(name);
            if path.exists() {
                return Ok(path);
            }
        }
    }
    anyhow::bail!(
        "Model file not found in {}. Tried: {:?}",
        dir.display(),
        names
    );
}

/// BLIP captioning pipeline
///
/// Runs on CPU; inference is moved to the blocking thread pool.
#[derive(Clone)]
pub struct BlipModel {
    encoder: BlipVisionEncoder,
    decoder: BlipTextDecoder,
    files: BlipModelFiles,
}

impl std::fmt::Debug for BlipModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipModel")
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl BlipModel {
    /// Load BLIP from a model directory
    ///
    /// Expected files:
    /// - vision_model.onnx (or vision_encoder.onnx / encoder.onnx)
    /// - text_decoder_model.onnx (or decoder_model.onnx / decoder.onnx)
    /// - tokenizer.json
    pub async fn new<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let files = BlipModelFiles::discover(model_dir)?;
        Self::from_files(files).await
    }

    /// Load BLIP from explicit file paths
    pub async fn from_files(files: BlipModelFiles) -> Result<Self> {
        info!("Loading BLIP captioning model");
        let to_load = files.clone();
        let (encoder, decoder) = tokio::task::spawn_blocking(move || -> Result<_> {
            let encoder = BlipVisionEncoder::new(&to_load.vision_encoder)
                .context("Failed to load BLIP vision encoder")?;
            let decoder = BlipTextDecoder::new(&to_load.text_decoder, &to_load.tokenizer)
                .context("Failed to load BLIP text decoder")?;
            Ok((encoder, decoder))
        })
        .await
        .context("BLIP loading task failed")??;

        info!("✅ BLIP pipeline ready (CPU-only)");
        Ok(Self {
            encoder,
            decoder,
            files,
        })
    }

    /// Caption an image on the current thread
    ///
    /// # Process
    /// 1. Preprocess image for encoder (resize, normalize)
    /// 2. Extract visual features with encoder
    /// 3. Beam search over decoder logits
    /// 4. Decode tokens to text
    pub fn caption_blocking(&self, image: &DynamicImage, options: &GenerationOptions) -> Result<String> {
        let start = Instant::now();

        let pixel_values = preprocess_for_blip(image);
        debug!("Preprocessed image shape: {:?}", pixel_values.shape());

        let embeddings = self
            .encoder
            .encode(&pixel_values)
            .context("Failed to encode image")?;
        debug!(
            "Encoded to {} positions x {} dimensions",
            embeddings.nrows(),
            embeddings.ncols()
        );

        let special = self.decoder.special_tokens();
        let tokens = beam_search(options, special.bos, special.eos, |sequences| {
            self.decoder.next_token_logits(&embeddings, sequences)
        })
        .context("Failed to generate caption")?;

        let caption = self.decoder.decode(&tokens)?;
        info!(
            "BLIP caption: {} tokens, {} chars, {}ms",
            tokens.len(),
            caption.len(),
            start.elapsed().as_millis()
        );

        Ok(caption)
    }
}

#[async_trait]
impl CaptionProvider for BlipModel {
    fn name(&self) -> &str {
        BLIP_MODEL_NAME
    }

    async fn caption(&self, image: &DynamicImage, options: &GenerationOptions) -> Result<String> {
        let model = self.clone();
        let image = image.clone();
        let options = *options;
        tokio::task::spawn_blocking(move || model.caption_blocking(&image, &options))
            .await
            .context("Caption task failed")?
    }
}
