// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption API endpoint module
//!
//! Provides POST /v1/caption (JSON result) and POST /v1/caption/download
//! (plain-text attachment) for multipart image uploads.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{caption_download_handler, caption_handler};
pub use request::CaptionUpload;
pub use response::{CaptionResponse, ImageSummary};
