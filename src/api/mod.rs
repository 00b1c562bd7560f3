// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod caption;
pub mod errors;
pub mod handlers;
pub mod server;

pub use caption::{caption_download_handler, caption_handler, CaptionResponse, CaptionUpload};
pub use errors::{ApiError, ApiErrorResponse, ErrorResponse};
pub use handlers::{HealthResponse, ModelInfo, ModelsResponse};
pub use server::{create_router, start_server, AppState, CaptionServer};
