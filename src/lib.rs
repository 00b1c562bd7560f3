// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod caption;
pub mod cli;
pub mod config;
pub mod version;
pub mod vision;

pub use caption::{CaptionError, CaptionResult, CaptionService};
pub use config::{CaptionBackend, CaptionConfig};
pub use vision::{CaptionProvider, GenerationOptions, ModelHandle};
