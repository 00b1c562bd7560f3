// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hosted captioning via an OpenAI-compatible vision API

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info};

use crate::vision::provider::{CaptionProvider, GenerationOptions};

// --- OpenAI-compatible serde structs ---

#[derive(serde::Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(serde::Serialize)]
struct ChatMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

const CAPTION_PROMPT: &str =
    "Write a single-sentence caption describing this image. Return only the caption.";

/// Request timeout for the hosted endpoint
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Caption provider backed by a remote OpenAI-compatible endpoint
pub struct HostedCaptioner {
    client: Client,
    endpoint: String,
    model_name: String,
}

impl HostedCaptioner {
    /// Create a new hosted client
    pub fn new(endpoint: &str, model_name: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Hosted captioner configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check if the hosted service is healthy
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Hosted captioner health check failed: {}", e);
                false
            }
        }
    }

    fn build_request(&self, data_url: String, options: &GenerationOptions) -> ChatRequest {
        ChatRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: serde_json::json!([
                    {"type": "text", "text": CAPTION_PROMPT},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]),
            }],
            max_tokens: options.max_length as u32,
            temperature: 0.2,
        }
    }
}

/// Encode an image as a PNG data URL
pub fn png_data_url(image: &DynamicImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("Failed to re-encode image as PNG")?;
    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(buffer.into_inner())
    ))
}

#[async_trait]
impl CaptionProvider for HostedCaptioner {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn caption(&self, image: &DynamicImage, options: &GenerationOptions) -> Result<String> {
        let start = std::time::Instant::now();
        let request = self.build_request(png_data_url(image)?, options);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&request)
            .send()
            .await
            .context("Hosted caption request failed")?
            .error_for_status()
            .context("Hosted caption endpoint returned an error")?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Invalid hosted caption response")?;
        let caption = chat_response
            .choices
            .first()
            .map(|c| c.message.content.trim().trim_matches('"').to_string())
            .unwrap_or_default();

        debug!(
            "Hosted caption in {}ms: '{}'",
            start.elapsed().as_millis(),
            caption
        );
        Ok(caption)
    }
}
