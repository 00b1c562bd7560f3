// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption model handle
//!
//! The loaded provider is a process-wide shared resource. It is created
//! lazily on first use and handed out only through `get_or_load`, so
//! concurrent first requests share a single load. A failed load is not
//! memoized; the next request tries again.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use hf_hub::api::tokio::ApiBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{CaptionBackend, CaptionConfig};
use crate::vision::blip::{
    BlipModel, BlipModelFiles, TEXT_DECODER_FILES, TOKENIZER_FILE, VISION_ENCODER_FILES,
};
use crate::vision::hosted::HostedCaptioner;
use crate::vision::provider::CaptionProvider;

/// Shared, type-erased provider
pub type SharedProvider = Arc<dyn CaptionProvider>;

/// Future-returning loader used to build the provider on first use
pub type ProviderLoader = Arc<dyn Fn() -> BoxFuture<'static, Result<SharedProvider>> + Send + Sync>;

/// Where the provider comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// BLIP export already on disk
    Local { model_dir: PathBuf },
    /// BLIP export on disk, fetched from the hub when files are missing
    Hub { repo: String, model_dir: PathBuf },
    /// Remote OpenAI-compatible endpoint
    Hosted { endpoint: String, model_name: String },
}

impl ModelSource {
    /// Pick the source described by the configuration
    pub fn from_config(config: &CaptionConfig) -> Result<Self> {
        match config.backend {
            CaptionBackend::Onnx if config.download_model => Ok(Self::Hub {
                repo: config.model_repo.clone(),
                model_dir: config.model_dir.clone(),
            }),
            CaptionBackend::Onnx => Ok(Self::Local {
                model_dir: config.model_dir.clone(),
            }),
            CaptionBackend::Hosted => {
                let endpoint = config
                    .hosted_endpoint
                    .clone()
                    .context("hosted backend requires an endpoint")?;
                Ok(Self::Hosted {
                    endpoint,
                    model_name: config.hosted_model.clone(),
                })
            }
        }
    }

    /// Short description for logs and the models endpoint
    pub fn describe(&self) -> String {
        match self {
            Self::Local { model_dir } => format!("onnx:{}", model_dir.display()),
            Self::Hub { repo, .. } => format!("onnx:hf://{}", repo),
            Self::Hosted { endpoint, .. } => format!("hosted:{}", endpoint),
        }
    }

    /// Build the provider for this source
    pub async fn load(&self) -> Result<SharedProvider> {
        match self {
            Self::Local { model_dir } => {
                let model = BlipModel::new(model_dir).await?;
                Ok(Arc::new(model))
            }
            Self::Hub { repo, model_dir } => {
                let files = match BlipModelFiles::discover(model_dir) {
                    Ok(files) => files,
                    Err(e) => {
                        info!("Local BLIP files unavailable ({}), fetching {} from the hub", e, repo);
                        fetch_blip_files(repo, model_dir).await?
                    }
                };
                let model = BlipModel::from_files(files).await?;
                Ok(Arc::new(model))
            }
            Self::Hosted {
                endpoint,
                model_name,
            } => {
                let client = HostedCaptioner::new(endpoint, model_name)?;
                Ok(Arc::new(client))
            }
        }
    }
}

/// Download the BLIP export into `cache_dir` via the Hugging Face hub
pub async fn fetch_blip_files(repo: &str, cache_dir: &Path) -> Result<BlipModelFiles> {
    let api = ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .with_progress(false)
        .build()
        .context("Failed to create Hugging Face hub client")?;
    let repo_api = api.model(repo.to_string());

    let mut resolved = Vec::with_capacity(3);
    let groups: [&[&str]; 3] = [VISION_ENCODER_FILES, TEXT_DECODER_FILES, &[TOKENIZER_FILE]];
    for names in groups {
        let mut found = None;
        for name in names {
            for candidate in [format!("onnx/{}", name), name.to_string()] {
                match repo_api.get(&candidate).await {
                    Ok(path) => {
                        info!("Fetched {} from {}", candidate, repo);
                        found = Some(path);
                        break;
                    }
                    Err(e) => tracing::debug!("{} not available in {}: {}", candidate, repo, e),
                }
            }
            if found.is_some() {
                break;
            }
        }
        let path = found.with_context(|| format!("None of {:?} found in {}", names, repo))?;
        resolved.push(path);
    }

    let tokenizer = resolved.pop().context("tokenizer path missing")?;
    let text_decoder = resolved.pop().context("decoder path missing")?;
    let vision_encoder = resolved.pop().context("encoder path missing")?;
    Ok(BlipModelFiles {
        vision_encoder,
        text_decoder,
        tokenizer,
    })
}

/// Lazily initialized caption provider
pub struct ModelHandle {
    description: String,
    loader: ProviderLoader,
    cell: OnceCell<SharedProvider>,
}

impl ModelHandle {
    /// Handle that loads from a configured source
    pub fn new(source: ModelSource) -> Self {
        let description = source.describe();
        let source = Arc::new(source);
        let loader: ProviderLoader = Arc::new(move || {
            let source = source.clone();
            Box::pin(async move { source.load().await })
        });
        Self::with_loader(description, loader)
    }

    /// Handle with a custom loader
    pub fn with_loader(description: impl Into<String>, loader: ProviderLoader) -> Self {
        Self {
            description: description.into(),
            loader,
            cell: OnceCell::new(),
        }
    }

    /// Handle around an already-built provider
    pub fn preloaded(provider: SharedProvider) -> Self {
        let description = provider.name().to_string();
        let loader: ProviderLoader = {
            let provider = provider.clone();
            Arc::new(move || {
                let provider = provider.clone();
                Box::pin(async move { Ok(provider) })
            })
        };
        Self {
            description,
            loader,
            cell: OnceCell::new_with(Some(provider)),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the provider has been loaded
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Name of the loaded provider, if any
    pub fn loaded_name(&self) -> Option<String> {
        self.cell.get().map(|p| p.name().to_string())
    }

    /// The single acquisition point for the provider
    pub async fn get_or_load(&self) -> Result<SharedProvider> {
        let provider = self
            .cell
            .get_or_try_init(|| async {
                info!("Loading caption model ({})", self.description);
                let result = (self.loader)().await;
                if let Err(ref e) = result {
                    warn!("⚠️ Failed to load caption model ({}): {:#}", self.description, e);
                }
                result
            })
            .await?;
        Ok(provider.clone())
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("description", &self.description)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
