// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! BLIP text decoder
//!
//! Scores next tokens for a batch of beams conditioned on the image
//! embeddings, and turns the winning token sequence back into text.

use anyhow::{Context, Result};
use ndarray::{s, Array2, Array3, ArrayView3, Ix3};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::load_cpu_session;

/// `[DEC]` token id in the BLIP vocabulary
pub const DEFAULT_BOS_TOKEN_ID: u32 = 30522;

/// `[SEP]` token id, used as end of sequence
pub const DEFAULT_EOS_TOKEN_ID: u32 = 102;

/// `[PAD]` token id
pub const DEFAULT_PAD_TOKEN_ID: u32 = 0;

/// Special token ids resolved from the tokenizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos: u32,
    pub eos: u32,
    pub pad: u32,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            bos: DEFAULT_BOS_TOKEN_ID,
            eos: DEFAULT_EOS_TOKEN_ID,
            pad: DEFAULT_PAD_TOKEN_ID,
        }
    }
}

impl SpecialTokens {
    /// Look the special tokens up by name, keeping BLIP defaults when absent
    pub fn from_tokenizer(tokenizer: &Tokenizer) -> Self {
        let defaults = Self::default();
        Self {
            bos: tokenizer
                .token_to_id("[DEC]")
                .or_else(|| tokenizer.token_to_id("[BOS]"))
                .unwrap_or(defaults.bos),
            eos: tokenizer.token_to_id("[SEP]").unwrap_or(defaults.eos),
            pad: tokenizer.token_to_id("[PAD]").unwrap_or(defaults.pad),
        }
    }
}

/// BLIP text decoder running on ONNX Runtime
#[derive(Clone)]
pub struct BlipTextDecoder {
    /// ONNX Runtime session for the decoder (thread-safe)
    session: Arc<Mutex<Session>>,
    /// Names of the inputs the exported graph declares
    input_names: Vec<String>,
    /// Tokenizer for caption decoding
    tokenizer: Arc<Tokenizer>,
    special_tokens: SpecialTokens,
    vocab_size: usize,
}

impl std::fmt::Debug for BlipTextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipTextDecoder")
            .field("input_names", &self.input_names)
            .field("special_tokens", &self.special_tokens)
            .field("vocab_size", &self.vocab_size)
            .finish_non_exhaustive()
    }
}

impl BlipTextDecoder {
    /// Load the decoder and its tokenizer
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - Tokenizer file not found or invalid
    /// - ONNX Runtime initialization fails
    pub fn new<P: AsRef<Path>>(model_path: P, tokenizer_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("BLIP text decoder not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("BLIP tokenizer not found: {}", tokenizer_path.display());
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        let vocab_size = tokenizer.get_vocab_size(true);
        let special_tokens = SpecialTokens::from_tokenizer(&tokenizer);
        info!(
            "Loaded tokenizer with {} tokens (bos={}, eos={})",
            vocab_size, special_tokens.bos, special_tokens.eos
        );

        info!("Loading BLIP text decoder from {}", model_path.display());
        let session = load_cpu_session(model_path)?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        debug!("Decoder inputs: {:?}", input_names);

        if !input_names.iter().any(|n| n == "input_ids")
            || !input_names.iter().any(|n| n == "encoder_hidden_states")
        {
            anyhow::bail!(
                "Decoder graph must take input_ids and encoder_hidden_states, found {:?}",
                input_names
            );
        }

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_names,
            tokenizer: Arc::new(tokenizer),
            special_tokens,
            vocab_size,
        })
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special_tokens
    }

    fn declares(&self, name: &str) -> bool {
        self.input_names.iter().any(|n| n == name)
    }

    /// Next-token logits for every beam
    ///
    /// All sequences must have the same length. The image embeddings are
    /// repeated across the batch.
    pub fn next_token_logits(
        &self,
        image_embeddings: &Array2<f32>,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>> {
        let batch = sequences.len();
        let seq_len = sequences.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || seq_len == 0 {
            anyhow::bail!("Decoder called with an empty batch");
        }

        let input_ids = token_batch(sequences)?;
        let (enc_len, hidden_dim) = image_embeddings.dim();
        let encoder_states: Array3<f32> = image_embeddings
            .broadcast((batch, enc_len, hidden_dim))
            .context("Failed to broadcast image embeddings")?
            .to_owned();

        let mut inputs: Vec<(Cow<'static, str>, SessionInputValue<'static>)> = vec![
            (
                "input_ids".into(),
                Value::from_array(input_ids)
                    .context("Failed to create input_ids tensor")?
                    .into(),
            ),
            (
                "encoder_hidden_states".into(),
                Value::from_array(encoder_states)
                    .context("Failed to create encoder_hidden_states tensor")?
                    .into(),
            ),
        ];
        if self.declares("attention_mask") {
            inputs.push((
                "attention_mask".into(),
                Value::from_array(Array2::<i64>::ones((batch, seq_len)))
                    .context("Failed to create attention_mask tensor")?
                    .into(),
            ));
        }
        if self.declares("encoder_attention_mask") {
            inputs.push((
                "encoder_attention_mask".into(),
                Value::from_array(Array2::<i64>::ones((batch, enc_len)))
                    .context("Failed to create encoder_attention_mask tensor")?
                    .into(),
            ));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Decoder session lock poisoned"))?;

        let outputs = session.run(inputs).context("Decoder inference failed")?;
        let logits = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract logits tensor")?
            .into_dimensionality::<Ix3>()
            .context("Decoder logits are not [batch, seq, vocab]")?;

        last_position_logits(logits.view(), batch)
    }

    /// Decode generated ids to caption text, dropping special tokens
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))?;
        Ok(clean_caption(&text))
    }
}

/// Logits at the final sequence position, one row per beam
///
/// Shape mismatches are errors; slicing an empty axis would panic while
/// the session lock is held.
pub fn last_position_logits(logits: ArrayView3<'_, f32>, batch: usize) -> Result<Vec<Vec<f32>>> {
    let (rows, seq_len, vocab) = logits.dim();
    if rows != batch {
        anyhow::bail!("Decoder returned batch {} for {} beams", rows, batch);
    }
    if seq_len == 0 || vocab == 0 {
        anyhow::bail!("Decoder returned empty logits of shape {:?}", logits.shape());
    }

    let last = seq_len - 1;
    Ok((0..batch)
        .map(|b| logits.slice(s![b, last, ..]).to_vec())
        .collect())
}

/// Pack equal-length sequences into an i64 [batch, seq_len] array
pub fn token_batch(sequences: &[Vec<u32>]) -> Result<Array2<i64>> {
    let seq_len = sequences.first().map(Vec::len).unwrap_or(0);
    if sequences.iter().any(|s| s.len() != seq_len) {
        anyhow::bail!("Beam sequences have different lengths");
    }
    let flat: Vec<i64> = sequences
        .iter()
        .flat_map(|s| s.iter().map(|&t| t as i64))
        .collect();
    Array2::from_shape_vec((sequences.len(), seq_len), flat).context("Failed to shape token batch")
}

/// Strip leftover special-token text and collapse whitespace
pub fn clean_caption(text: &str) -> String {
    text.replace("[DEC]", "")
        .replace("[SEP]", "")
        .replace("[CLS]", "")
        .replace("[PAD]", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
