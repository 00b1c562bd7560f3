// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption upload parsing and validation

use axum::http::StatusCode;
use axum_extra::extract::Multipart;

use crate::api::errors::ApiError;
use crate::vision::image_utils::is_supported_mime;
use crate::vision::provider::{MAX_CAPTION_LENGTH, MIN_CAPTION_LENGTH};

/// Multipart field carrying the image file
pub const IMAGE_FIELD: &str = "image";

/// Multipart field carrying the caption length bound
pub const MAX_LENGTH_FIELD: &str = "max_length";

/// A parsed caption upload
#[derive(Debug, Clone)]
pub struct CaptionUpload {
    /// Client-side file name, if the part had one
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub max_length: usize,
}

impl CaptionUpload {
    /// Read the upload from a multipart body
    ///
    /// Unknown fields are skipped. `max_length` falls back to
    /// `default_max_length` when absent or blank.
    pub async fn from_multipart(
        mut multipart: Multipart,
        default_max_length: usize,
        upload_limit: usize,
    ) -> Result<Self, ApiError> {
        let mut image: Option<(Option<String>, Option<String>, Vec<u8>)> = None;
        let mut max_length = default_max_length;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return Err(multipart_error(e.status(), e.to_string(), upload_limit)),
            };

            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                IMAGE_FIELD => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(e.status(), e.to_string(), upload_limit))?;
                    image = Some((file_name, content_type, bytes.to_vec()));
                }
                MAX_LENGTH_FIELD => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e.status(), e.to_string(), upload_limit))?;
                    if !text.trim().is_empty() {
                        max_length = parse_max_length(&text)?;
                    }
                }
                _ => {}
            }
        }

        let (file_name, content_type, bytes) = image.ok_or_else(|| ApiError::ValidationError {
            field: IMAGE_FIELD.to_string(),
            message: "image is required".to_string(),
        })?;

        Ok(Self {
            file_name,
            content_type,
            bytes,
            max_length,
        })
    }

    /// Validate the upload before it reaches the service
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.bytes.is_empty() {
            return Err(ApiError::ValidationError {
                field: IMAGE_FIELD.to_string(),
                message: "image is empty".to_string(),
            });
        }

        // Generic binary types are left to the magic-byte check
        if let Some(ref content_type) = self.content_type {
            if !is_supported_mime(content_type) && !content_type.starts_with("application/octet-stream") {
                return Err(ApiError::UnsupportedMediaType(format!(
                    "'{}' is not supported, upload a PNG or JPEG",
                    content_type
                )));
            }
        }

        if !(MIN_CAPTION_LENGTH..=MAX_CAPTION_LENGTH).contains(&self.max_length) {
            return Err(ApiError::ValidationError {
                field: MAX_LENGTH_FIELD.to_string(),
                message: format!(
                    "max_length must be between {} and {}, got {}",
                    MIN_CAPTION_LENGTH, MAX_CAPTION_LENGTH, self.max_length
                ),
            });
        }

        Ok(())
    }

    /// File name used to derive the download name
    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("image")
    }
}

/// Parse the `max_length` form value
pub fn parse_max_length(raw: &str) -> Result<usize, ApiError> {
    raw.trim().parse().map_err(|_| ApiError::ValidationError {
        field: MAX_LENGTH_FIELD.to_string(),
        message: format!("max_length must be an integer, got '{}'", raw.trim()),
    })
}

fn multipart_error(status: StatusCode, message: String, upload_limit: usize) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            size: None,
            limit: upload_limit,
        }
    } else {
        ApiError::InvalidRequest(format!("Malformed multipart body: {}", message))
    }
}
