// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image captioning service
//!
//! Ties upload decoding, the shared model handle and generation options
//! into one request-scoped operation.

pub mod errors;
pub mod service;

pub use errors::CaptionError;
pub use service::{caption_file_name, CaptionResult, CaptionService};
