// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod caption;

pub use caption::{caption_file, execute, CaptionCli};

use anyhow::Result;
use clap::{Args, Parser};
use std::path::PathBuf;
use tracing::info;

use crate::config::{CaptionBackend, CaptionConfig};

/// Configuration flags shared by the server and the CLI
///
/// Flags override the config file and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML config file
    #[arg(long, env = "CAPTION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Caption backend
    #[arg(long, value_enum)]
    pub backend: Option<CaptionBackend>,

    /// Directory holding the BLIP ONNX export
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Hugging Face repository to fetch the export from
    #[arg(long)]
    pub model_repo: Option<String>,

    /// Fetch missing model files from the hub
    #[arg(long)]
    pub download_model: bool,

    /// Load the model at startup
    #[arg(long)]
    pub preload_model: bool,

    /// OpenAI-compatible endpoint for the hosted backend
    #[arg(long)]
    pub hosted_endpoint: Option<String>,

    #[arg(long)]
    pub hosted_model: Option<String>,

    /// Length bound used when a request carries none (20-100)
    #[arg(long)]
    pub default_max_length: Option<usize>,

    #[arg(long)]
    pub max_upload_bytes: Option<usize>,
}

impl ConfigArgs {
    /// Resolve the full configuration: defaults, file, environment, flags
    pub fn load(&self) -> Result<CaptionConfig> {
        let mut config = match self.config {
            Some(ref path) => {
                info!("Loading configuration from {}", path.display());
                CaptionConfig::from_file(path)?
            }
            None => CaptionConfig::default(),
        };
        config.apply_env();
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Apply the flags that were given
    pub fn apply(&self, config: &mut CaptionConfig) {
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(ref dir) = self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(ref repo) = self.model_repo {
            config.model_repo = repo.clone();
        }
        if self.download_model {
            config.download_model = true;
        }
        if self.preload_model {
            config.preload_model = true;
        }
        if let Some(ref endpoint) = self.hosted_endpoint {
            config.hosted_endpoint = Some(endpoint.clone());
        }
        if let Some(ref model) = self.hosted_model {
            config.hosted_model = model.clone();
        }
        if let Some(length) = self.default_max_length {
            config.default_max_length = length;
        }
        if let Some(bytes) = self.max_upload_bytes {
            config.max_upload_bytes = bytes;
        }
    }
}

/// Fabstir caption node
#[derive(Parser, Debug)]
#[command(name = "fabstir-caption-node")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "HTTP service that captions uploaded images", long_about = None)]
pub struct NodeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}
