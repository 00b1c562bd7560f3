// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::caption::CaptionError;
use crate::vision::image_utils::ImageError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub request_id: Option<String>,
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    NotFound(String),
    InvalidRequest(String),
    ValidationError { field: String, message: String },
    InvalidImage(String),
    UnsupportedMediaType(String),
    PayloadTooLarge { size: Option<usize>, limit: usize },
    ServiceUnavailable(String),
    GenerationFailed(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message, details) = match self {
            ApiError::NotFound(msg) => ("not_found", msg.clone(), None),
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                ("validation_error", message.clone(), Some(details))
            }
            ApiError::InvalidImage(msg) => ("invalid_image", msg.clone(), None),
            ApiError::UnsupportedMediaType(msg) => ("unsupported_media_type", msg.clone(), None),
            ApiError::PayloadTooLarge { size, limit } => {
                let mut details = HashMap::new();
                details.insert(
                    "limit".to_string(),
                    serde_json::Value::Number((*limit).into()),
                );
                let message = match size {
                    Some(size) => {
                        details.insert("size".to_string(), serde_json::Value::Number((*size).into()));
                        format!("Image is {} bytes, limit is {} bytes", size, limit)
                    }
                    None => format!("Upload exceeds the limit of {} bytes", limit),
                };
                ("payload_too_large", message, Some(details))
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone(), None),
            ApiError::GenerationFailed(msg) => ("generation_failed", msg.clone(), None),
            ApiError::InternalError(msg) => ("internal_error", msg.clone(), None),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_)
            | ApiError::ValidationError { .. }
            | ApiError::InvalidImage(_) => 400,
            ApiError::UnsupportedMediaType(_) => 415,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::GenerationFailed(_) | ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::InvalidImage(msg) => write!(f, "Invalid image: {}", msg),
            ApiError::UnsupportedMediaType(msg) => write!(f, "Unsupported media type: {}", msg),
            ApiError::PayloadTooLarge { limit, .. } => {
                write!(f, "Payload too large (limit {} bytes)", limit)
            }
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::GenerationFailed(msg) => write!(f, "Generation failed: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<CaptionError> for ApiError {
    fn from(err: CaptionError) -> Self {
        match err {
            CaptionError::InvalidLength { .. } => ApiError::ValidationError {
                field: "max_length".to_string(),
                message: err.to_string(),
            },
            CaptionError::Decode(ImageError::TooLarge(size, limit)) => {
                ApiError::PayloadTooLarge {
                    size: Some(size),
                    limit,
                }
            }
            CaptionError::Decode(ImageError::UnsupportedFormat) => {
                ApiError::UnsupportedMediaType(ImageError::UnsupportedFormat.to_string())
            }
            CaptionError::Decode(e) => ApiError::InvalidImage(e.to_string()),
            CaptionError::ModelUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            CaptionError::Generation(_) | CaptionError::EmptyCaption => {
                ApiError::GenerationFailed(err.to_string())
            }
        }
    }
}

/// Error response wrapper carrying the request id into the body
pub struct ApiErrorResponse {
    pub error: ApiError,
    pub request_id: Option<String>,
}

impl ApiErrorResponse {
    pub fn new(error: ApiError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: Some(request_id.into()),
        }
    }
}

impl From<ApiError> for ApiErrorResponse {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error_response = self.error.to_response(self.request_id);

        (status, Json(error_response)).into_response()
    }
}
