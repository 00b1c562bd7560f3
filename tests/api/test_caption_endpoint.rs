// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Caption endpoint tests for POST /v1/caption and POST /v1/caption/download

use axum::http::{header, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use super::support::{
    app_with_provider, body_json, body_text, caption_request, solid_jpeg, solid_png,
    FixedCaptioner,
};

#[tokio::test]
async fn test_caption_solid_png_at_min_length() {
    let provider = Arc::new(FixedCaptioner::new("a blue square"));
    let app = app_with_provider(provider.clone());

    let req = caption_request("/v1/caption", "square.png", "image/png", solid_png(64, 64), Some("20"));
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["caption"], "a blue square");
    assert_eq!(json["fileName"], "square.png");
    assert_eq!(json["downloadName"], "caption_square.txt");
    assert_eq!(json["maxLength"], 20);
    assert_eq!(json["model"], "fixed-captioner");
    assert_eq!(json["image"]["width"], 64);
    assert_eq!(json["image"]["height"], 64);
    assert_eq!(json["image"]["format"], "PNG");
    assert_eq!(json["image"]["mode"], "RGB");
    assert!(json["image"]["sizeBytes"].as_u64().unwrap() > 0);
    assert!(json["processingTimeMs"].is_u64());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_caption_jpeg_with_default_length() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("a photo")));

    let req = caption_request("/v1/caption", "holiday.jpg", "image/jpeg", solid_jpeg(120, 80), None);
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["maxLength"], 50);
    assert_eq!(json["image"]["format"], "JPEG");
    assert_eq!(json["image"]["width"], 120);
    assert_eq!(json["downloadName"], "caption_holiday.txt");
}

#[tokio::test]
async fn test_caption_every_length_in_range() {
    for length in ["20", "35", "50", "99", "100"] {
        let app = app_with_provider(Arc::new(FixedCaptioner::new("text")));
        let req = caption_request("/v1/caption", "a.png", "image/png", solid_png(16, 16), Some(length));
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "max_length={}", length);
    }
}

#[tokio::test]
async fn test_download_returns_text_attachment() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("a cat on a sofa")));

    let req = caption_request(
        "/v1/caption/download",
        "my.cat.photo.png",
        "image/png",
        solid_png(32, 32),
        Some("40"),
    );
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(disposition, "attachment; filename=\"caption_my.txt\"");
    assert_eq!(body_text(response).await, "a cat on a sofa");
}

#[tokio::test]
async fn test_lazy_model_loads_on_first_request() {
    use super::support::{flaky_handle, state_with_handle};
    use fabstir_caption_node::api::create_router;

    let loads = Arc::new(AtomicUsize::new(0));
    let state = state_with_handle(flaky_handle(0, loads.clone()), 10 * 1024 * 1024);
    let app = create_router(state.clone());

    assert!(!state.handle().is_loaded());
    for _ in 0..3 {
        let req = caption_request("/v1/caption", "x.png", "image/png", solid_png(8, 8), None);
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert!(state.handle().is_loaded());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}
