// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::ConfigArgs;
use crate::caption::{caption_file_name, CaptionResult, CaptionService};
use crate::vision::model_manager::{ModelHandle, ModelSource};

/// Caption a local image file
#[derive(Parser, Debug)]
#[command(name = "caption-cli")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "Generate a caption for a PNG or JPEG file", long_about = None)]
pub struct CaptionCli {
    /// Image to caption
    pub image: PathBuf,

    /// Caption length bound (20-100)
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Directory for caption_<name>.txt (defaults to the current directory)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Execute CLI command
pub async fn execute(cli: CaptionCli) -> Result<()> {
    let config = cli.config.load()?;
    let max_length = cli.max_length.unwrap_or(config.default_max_length);
    let output_dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));

    let source = ModelSource::from_config(&config)?;
    let handle = Arc::new(ModelHandle::new(source));
    let service = CaptionService::new(handle, config.max_upload_bytes);

    let (result, written) = caption_file(&service, &cli.image, max_length, &output_dir).await?;

    if cli.json {
        let json = serde_json::json!({
            "caption": result.caption,
            "model": result.model,
            "maxLength": result.max_length,
            "processingTimeMs": result.processing_time_ms,
            "image": {
                "width": result.image.width,
                "height": result.image.height,
                "format": result.image.format_name(),
                "mode": result.image.color_mode,
                "sizeBytes": result.image.size_bytes,
            },
            "output": written.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", result.caption);
        eprintln!("Saved caption to {}", written.display());
    }
    Ok(())
}

/// Caption `image_path` and write the caption file into `output_dir`
pub async fn caption_file(
    service: &CaptionService,
    image_path: &Path,
    max_length: usize,
    output_dir: &Path,
) -> Result<(CaptionResult, PathBuf)> {
    let bytes = tokio::fs::read(image_path)
        .await
        .with_context(|| format!("Failed to read {}", image_path.display()))?;

    let result = service
        .generate_caption(bytes, max_length)
        .await
        .with_context(|| format!("Failed to caption {}", image_path.display()))?;

    let upload_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output_path = output_dir.join(caption_file_name(&upload_name));

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    tokio::fs::write(&output_path, &result.caption)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    info!("Wrote {}", output_path.display());
    Ok((result, output_path))
}
