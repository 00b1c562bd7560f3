// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! BLIP vision encoder
//!
//! Extracts patch embeddings from a preprocessed image for the text decoder.

use anyhow::{Context, Result};
use ndarray::{Array2, Array4, Axis, Ix2};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::load_cpu_session;
use super::preprocessing::BLIP_INPUT_SIZE;

/// BLIP vision encoder (ViT) running on ONNX Runtime
#[derive(Clone)]
pub struct BlipVisionEncoder {
    /// ONNX Runtime session (thread-safe)
    session: Arc<Mutex<Session>>,
    /// Model input name
    input_name: String,
}

impl std::fmt::Debug for BlipVisionEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipVisionEncoder")
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

impl BlipVisionEncoder {
    /// Load the vision encoder from an ONNX file
    ///
    /// # Errors
    /// Returns error if the file is missing or ONNX Runtime rejects it.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("BLIP vision encoder not found: {}", model_path.display());
        }

        info!("Loading BLIP vision encoder from {}", model_path.display());
        let session = load_cpu_session(model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());

        debug!("Vision encoder input: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
        })
    }

    /// Encode a preprocessed image
    ///
    /// # Arguments
    /// - `input`: tensor of shape [1, 3, 384, 384] from `preprocess_for_blip()`
    ///
    /// # Returns
    /// - Image embeddings of shape [seq_len, hidden_dim]
    pub fn encode(&self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let shape = input.shape();
        if shape[0] != 1 || shape[1] != 3 {
            anyhow::bail!("Invalid input shape: {:?}, expected [1, 3, H, W]", shape);
        }
        if shape[2] != BLIP_INPUT_SIZE as usize || shape[3] != BLIP_INPUT_SIZE as usize {
            debug!(
                "Input size {}x{} differs from expected {}x{}",
                shape[2], shape[3], BLIP_INPUT_SIZE, BLIP_INPUT_SIZE
            );
        }

        let input_value =
            Value::from_array(input.to_owned()).context("Failed to create pixel_values tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Vision encoder session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .context("Vision encoder inference failed")?;

        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract last_hidden_state")?;
        debug!("Vision encoder output shape: {:?}", hidden.shape());

        parse_hidden_state(hidden.view())
    }
}

/// Flatten an encoder output to [seq_len, hidden_dim]
///
/// Accepts [1, seq_len, dim] or [seq_len, dim].
pub fn parse_hidden_state(output: ndarray::ArrayViewD<'_, f32>) -> Result<Array2<f32>> {
    match output.ndim() {
        3 if output.shape()[0] == 1 => output
            .index_axis(Axis(0), 0)
            .to_owned()
            .into_dimensionality::<Ix2>()
            .context("Encoder output is not two-dimensional after batch removal"),
        2 => output
            .to_owned()
            .into_dimensionality::<Ix2>()
            .context("Encoder output is not two-dimensional"),
        _ => anyhow::bail!("Unexpected encoder output shape: {:?}", output.shape()),
    }
}
