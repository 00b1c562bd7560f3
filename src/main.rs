// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Parser;
use fabstir_caption_node::{api::start_server, cli::NodeArgs, config::CaptionBackend, version};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Fabstir Caption Node...\n");
    println!("📦 {}", version::get_version_string());
    println!("   Build: {}", version::VERSION);
    println!();

    let args = NodeArgs::parse();
    let config = args.config.load()?;

    println!("🖼️  Caption backend: {}", config.backend.as_str());
    match config.backend {
        CaptionBackend::Onnx => {
            println!("   Model directory: {}", config.model_dir.display());
            if config.download_model {
                println!("   Missing files fetched from: {}", config.model_repo);
            }
        }
        CaptionBackend::Hosted => {
            println!(
                "   Endpoint: {}",
                config.hosted_endpoint.as_deref().unwrap_or_default()
            );
        }
    }
    println!(
        "🌐 API: http://{}:{} (default max_length {})\n",
        config.host, config.port, config.default_max_length
    );

    start_server(config).await
}
