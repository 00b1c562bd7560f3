// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption endpoint handlers

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::Multipart;
use tracing::{info, warn};
use uuid::Uuid;

use super::request::CaptionUpload;
use super::response::CaptionResponse;
use crate::api::errors::{ApiError, ApiErrorResponse};
use crate::api::server::AppState;
use crate::caption::{caption_file_name, CaptionResult};

/// POST /v1/caption - Generate a caption for an uploaded image
///
/// Accepts a multipart form with an `image` file (PNG or JPEG) and an
/// optional `max_length` (20-100).
pub async fn caption_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiErrorResponse> {
    let (upload, result) = run_caption(&state, multipart).await?;
    Ok(Json(CaptionResponse::new(result, upload.display_name())))
}

/// POST /v1/caption/download - Same input, caption returned as a .txt attachment
pub async fn caption_download_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiErrorResponse> {
    let (upload, result) = run_caption(&state, multipart).await?;
    let file_name = caption_file_name(upload.display_name());

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        result.caption,
    )
        .into_response())
}

async fn run_caption(
    state: &AppState,
    multipart: Multipart,
) -> Result<(CaptionUpload, CaptionResult), ApiErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    let fail = |error: ApiError| {
        info!("[{}] caption request rejected: {}", request_id, error);
        ApiErrorResponse::new(error, request_id.clone())
    };

    let mut upload = CaptionUpload::from_multipart(
        multipart,
        state.config.default_max_length,
        state.service.max_upload_bytes(),
    )
    .await
    .map_err(fail)?;
    upload.validate().map_err(fail)?;

    info!(
        "[{}] caption request: {} ({} bytes, max_length={})",
        request_id,
        upload.display_name(),
        upload.bytes.len(),
        upload.max_length
    );

    let bytes = std::mem::take(&mut upload.bytes);
    let result = state
        .service
        .generate_caption(bytes, upload.max_length)
        .await
        .map_err(|e| {
            if e.is_client_error() {
                info!("[{}] caption request rejected: {}", request_id, e);
            } else {
                warn!("[{}] caption failed: {}", request_id, e);
            }
            ApiErrorResponse::new(e.into(), request_id.clone())
        })?;

    Ok((upload, result))
}
