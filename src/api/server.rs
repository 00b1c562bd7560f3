// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::caption::{caption_download_handler, caption_handler};
use super::errors::{ApiError, ApiErrorResponse};
use super::handlers::{HealthResponse, ModelInfo, ModelsResponse};
use crate::caption::CaptionService;
use crate::config::{CaptionBackend, CaptionConfig};
use crate::vision::hosted::HostedCaptioner;
use crate::vision::model_manager::{ModelHandle, ModelSource};

const INDEX_HTML: &str = include_str!("static/index.html");

/// Room for multipart boundaries and the small form fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: CaptionService,
    pub config: Arc<CaptionConfig>,
    /// Client used by /health to reach the hosted endpoint
    pub hosted_probe: Option<Arc<HostedCaptioner>>,
}

impl AppState {
    pub fn new(service: CaptionService, config: CaptionConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
            hosted_probe: None,
        }
    }

    /// State with a handle built from the configured model source
    pub fn from_config(config: CaptionConfig) -> Result<Self> {
        let source = ModelSource::from_config(&config)?;
        let probe = match &source {
            ModelSource::Hosted {
                endpoint,
                model_name,
            } => Some(Arc::new(HostedCaptioner::new(endpoint, model_name)?)),
            _ => None,
        };
        let handle = Arc::new(ModelHandle::new(source));
        let service = CaptionService::new(handle, config.max_upload_bytes);
        Ok(Self::new(service, config).with_hosted_probe(probe))
    }

    pub fn with_hosted_probe(mut self, probe: Option<Arc<HostedCaptioner>>) -> Self {
        self.hosted_probe = probe;
        self
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        self.service.handle()
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.service.max_upload_bytes() + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/caption", post(caption_handler))
        .route("/v1/caption/download", post(caption_download_handler))
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut issues = Vec::new();

    if let Some(probe) = &state.hosted_probe {
        if !probe.health_check().await {
            issues.push(format!("Hosted endpoint {} is unreachable", probe.endpoint()));
        }
    }

    let status = if issues.is_empty() { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        model_loaded: state.handle().is_loaded(),
        backend: state.config.backend.as_str().to_string(),
        version: crate::version::VERSION_NUMBER.to_string(),
        issues: if issues.is_empty() { None } else { Some(issues) },
    })
}

async fn version_handler() -> impl IntoResponse {
    Json(crate::version::get_version_info())
}

async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    let handle = state.handle();
    let name = handle
        .loaded_name()
        .unwrap_or_else(|| configured_model_name(&state.config));

    (
        StatusCode::OK,
        Json(ModelsResponse {
            models: vec![ModelInfo {
                id: name.clone(),
                name,
                loaded: handle.is_loaded(),
                description: Some(handle.description().to_string()),
            }],
            backend: state.config.backend.as_str().to_string(),
        }),
    )
}

async fn fallback_handler(uri: Uri) -> ApiErrorResponse {
    ApiError::NotFound(format!("No route for {}", uri.path())).into()
}

fn configured_model_name(config: &CaptionConfig) -> String {
    match config.backend {
        CaptionBackend::Onnx => crate::vision::blip::model::BLIP_MODEL_NAME.to_string(),
        CaptionBackend::Hosted => config.hosted_model.clone(),
    }
}

/// Running HTTP server
pub struct CaptionServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl CaptionServer {
    /// Bind and serve in the background
    pub async fn start(state: AppState, addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        let actual_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = create_router(state);

        let task = tokio::spawn(async move {
            let serve_future = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve_future.await {
                warn!("HTTP server stopped with error: {}", e);
            }
        });

        info!("Caption API listening on http://{}", actual_addr);
        Ok(Self {
            addr: actual_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.task.await.context("HTTP server task panicked")?;
        info!("Caption API stopped");
        Ok(())
    }
}

/// Serve until Ctrl-C
pub async fn start_server(config: CaptionConfig) -> Result<()> {
    let addr = config.bind_addr()?;
    let preload = config.preload_model;
    let state = AppState::from_config(config)?;

    if preload {
        match state.handle().get_or_load().await {
            Ok(provider) => info!("✅ Caption model preloaded: {}", provider.name()),
            Err(e) => warn!("⚠️ Model preload failed, will retry on first request: {:#}", e),
        }
    }

    let server = CaptionServer::start(state, addr).await?;
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    server.shutdown().await
}
