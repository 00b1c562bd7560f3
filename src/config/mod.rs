// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption node configuration
//!
//! Layered as: defaults, then an optional TOML file, then environment
//! variables, then command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::vision::image_utils::MAX_IMAGE_SIZE;
use crate::vision::provider::{DEFAULT_CAPTION_LENGTH, MAX_CAPTION_LENGTH, MIN_CAPTION_LENGTH};

/// Which provider produces captions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptionBackend {
    /// Local BLIP ONNX pipeline
    Onnx,
    /// OpenAI-compatible hosted endpoint
    Hosted,
}

impl CaptionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Hosted => "hosted",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "onnx" | "local" | "blip" => Some(Self::Onnx),
            "hosted" | "remote" | "api" => Some(Self::Hosted),
            _ => None,
        }
    }
}

impl Default for CaptionBackend {
    fn default() -> Self {
        Self::Onnx
    }
}

/// Caption node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Address the HTTP server binds to
    pub host: String,
    pub port: u16,
    pub backend: CaptionBackend,
    /// Directory holding the BLIP ONNX export
    pub model_dir: PathBuf,
    /// Hugging Face repository used when downloading the export
    pub model_repo: String,
    /// Fetch missing model files from the hub on first load
    pub download_model: bool,
    /// Load the model at startup instead of on the first request
    pub preload_model: bool,
    pub hosted_endpoint: Option<String>,
    pub hosted_model: String,
    /// Length bound used when a request carries none
    pub default_max_length: usize,
    pub max_upload_bytes: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            backend: CaptionBackend::Onnx,
            model_dir: PathBuf::from("./models/blip-onnx"),
            model_repo: "Xenova/blip-image-captioning-base".to_string(),
            download_model: false,
            preload_model: false,
            hosted_endpoint: None,
            hosted_model: "blip-image-captioning-base".to_string(),
            default_max_length: DEFAULT_CAPTION_LENGTH,
            max_upload_bytes: MAX_IMAGE_SIZE,
        }
    }
}

impl CaptionConfig {
    /// Load configuration from a TOML file
    ///
    /// Keys may sit at the top level or under a `[caption]` table.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?;

        let table = toml_value.get("caption").cloned().unwrap_or(toml_value);
        let config: CaptionConfig = table
            .try_into()
            .with_context(|| format!("Invalid caption config in {}", path.display()))?;
        Ok(config)
    }

    /// Apply overrides from environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_env_with<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = get("API_HOST") {
            self.host = val;
        }
        if let Some(num) = get("API_PORT").and_then(|v| v.parse().ok()) {
            self.port = num;
        }
        if let Some(backend) = get("CAPTION_BACKEND").and_then(|v| CaptionBackend::parse(&v)) {
            self.backend = backend;
        }
        if let Some(val) = get("CAPTION_MODEL_DIR") {
            self.model_dir = PathBuf::from(val);
        }
        if let Some(val) = get("CAPTION_MODEL_REPO") {
            self.model_repo = val;
        }
        if let Some(val) = get("CAPTION_DOWNLOAD_MODEL") {
            self.download_model = parse_flag(&val);
        }
        if let Some(val) = get("CAPTION_PRELOAD_MODEL") {
            self.preload_model = parse_flag(&val);
        }
        if let Some(val) = get("VLM_ENDPOINT") {
            self.hosted_endpoint = Some(val);
        }
        if let Some(val) = get("VLM_MODEL_NAME") {
            self.hosted_model = val;
        }
        if let Some(num) = get("CAPTION_DEFAULT_MAX_LENGTH").and_then(|v| v.parse().ok()) {
            self.default_max_length = num;
        }
        if let Some(num) = get("MAX_UPLOAD_BYTES").and_then(|v| v.parse().ok()) {
            self.max_upload_bytes = num;
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CAPTION_LENGTH..=MAX_CAPTION_LENGTH).contains(&self.default_max_length) {
            anyhow::bail!(
                "default_max_length must be between {} and {}, got {}",
                MIN_CAPTION_LENGTH,
                MAX_CAPTION_LENGTH,
                self.default_max_length
            );
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be positive");
        }
        if self.backend == CaptionBackend::Hosted && self.hosted_endpoint.is_none() {
            anyhow::bail!("hosted backend selected but no hosted_endpoint (VLM_ENDPOINT) set");
        }
        Ok(())
    }

    /// Socket address for the HTTP server
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
