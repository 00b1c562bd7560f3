// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Error handling tests for the caption endpoints
//!
//! Every failure must come back as a typed JSON error, never as an empty
//! caption or a dropped connection.

use axum::http::StatusCode;
use fabstir_caption_node::api::create_router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use super::support::{
    app_with_provider, body_json, caption_request, flaky_handle, multipart_body,
    multipart_request, solid_png, state_with_handle, FailingCaptioner, FixedCaptioner, Part,
};

async fn expect_error(
    app: axum::Router,
    req: axum::http::Request<axum::body::Body>,
    status: StatusCode,
    error_type: &str,
) -> serde_json::Value {
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], error_type, "body: {}", json);
    json
}

#[tokio::test]
async fn test_max_length_out_of_range() {
    for bad in ["0", "19", "101", "1000"] {
        let provider = Arc::new(FixedCaptioner::new("never"));
        let app = app_with_provider(provider.clone());
        let req = caption_request("/v1/caption", "a.png", "image/png", solid_png(8, 8), Some(bad));

        let json = expect_error(app, req, StatusCode::BAD_REQUEST, "validation_error").await;
        assert_eq!(json["details"]["field"], "max_length");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_max_length_not_a_number() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("never")));
    let req = caption_request("/v1/caption", "a.png", "image/png", solid_png(8, 8), Some("long"));
    expect_error(app, req, StatusCode::BAD_REQUEST, "validation_error").await;
}

#[tokio::test]
async fn test_missing_image_field() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("never")));
    let body = multipart_body(vec![Part::Text {
        name: "max_length",
        value: "30",
    }]);
    let json = expect_error(
        app,
        multipart_request("/v1/caption", body),
        StatusCode::BAD_REQUEST,
        "validation_error",
    )
    .await;
    assert_eq!(json["details"]["field"], "image");
}

#[tokio::test]
async fn test_gif_upload_rejected() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("never")));
    let gif = b"GIF89a\x01\x00\x01\x00\x80\x00\x00".to_vec();
    let req = caption_request("/v1/caption", "anim.gif", "image/gif", gif, None);
    expect_error(app, req, StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type").await;
}

#[tokio::test]
async fn test_non_image_bytes_with_generic_type() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("never")));
    let req = caption_request(
        "/v1/caption",
        "notes.png",
        "application/octet-stream",
        b"definitely not pixels".to_vec(),
        None,
    );
    let json = expect_error(app, req, StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type").await;
    assert!(json["request_id"].is_string());
}

#[tokio::test]
async fn test_corrupt_png_is_decode_error() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("never")));
    let mut corrupt = solid_png(16, 16);
    corrupt.truncate(40);
    let req = caption_request("/v1/caption", "broken.png", "image/png", corrupt, None);
    expect_error(app, req, StatusCode::BAD_REQUEST, "invalid_image").await;
}

#[tokio::test]
async fn test_upload_over_limit() {
    let state = state_with_handle(
        fabstir_caption_node::vision::ModelHandle::preloaded(Arc::new(FixedCaptioner::new("never"))),
        64,
    );
    let app = create_router(state);
    let req = caption_request("/v1/caption", "big.png", "image/png", solid_png(64, 64), None);
    let json = expect_error(app, req, StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large").await;
    assert_eq!(json["details"]["limit"], 64);
}

#[tokio::test]
async fn test_generation_failure_is_500() {
    let app = app_with_provider(Arc::new(FailingCaptioner));
    let req = caption_request("/v1/caption", "a.png", "image/png", solid_png(8, 8), None);
    let json = expect_error(app, req, StatusCode::INTERNAL_SERVER_ERROR, "generation_failed").await;
    assert!(json["message"].as_str().unwrap().contains("decoder session crashed"));
}

#[tokio::test]
async fn test_empty_caption_is_500() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("  ")));
    let req = caption_request("/v1/caption", "a.png", "image/png", solid_png(8, 8), None);
    expect_error(app, req, StatusCode::INTERNAL_SERVER_ERROR, "generation_failed").await;
}

#[tokio::test]
async fn test_model_load_failure_is_503_and_retried() {
    let loads = Arc::new(AtomicUsize::new(0));
    let state = state_with_handle(flaky_handle(1, loads.clone()), 10 * 1024 * 1024);
    let app = create_router(state.clone());

    let req = caption_request("/v1/caption", "a.png", "image/png", solid_png(8, 8), None);
    let json = expect_error(app.clone(), req, StatusCode::SERVICE_UNAVAILABLE, "service_unavailable").await;
    assert!(json["message"].as_str().unwrap().contains("model files missing"));
    assert!(!state.handle().is_loaded());

    // The failure was not memoized
    let req = caption_request("/v1/caption", "a.png", "image/png", solid_png(8, 8), None);
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["caption"], "a lazy caption");
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bad_image_does_not_trigger_model_load() {
    let loads = Arc::new(AtomicUsize::new(0));
    let state = state_with_handle(flaky_handle(0, loads.clone()), 10 * 1024 * 1024);
    let app = create_router(state.clone());

    let req = caption_request("/v1/caption", "a.png", "image/png", b"nope".to_vec(), None);
    let response = app.oneshot(req).await.unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}
