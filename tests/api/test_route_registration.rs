// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Route registration tests for the caption node router

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use fabstir_caption_node::api::{create_router, AppState};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use super::support::{
    app_with_provider, body_json, body_text, caption_request, flaky_handle, hosted_config,
    solid_png, spawn_hosted_stub, state_with_handle, FixedCaptioner,
};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_index_page_served() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("x")));
    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    let html = body_text(response).await;
    assert!(html.contains("Image Caption Generator"));
    assert!(html.contains("/v1/caption"));
    assert!(html.contains("max_length"));
}

#[tokio::test]
async fn test_health_reports_lazy_model_state() {
    let loads = Arc::new(AtomicUsize::new(0));
    let app = create_router(state_with_handle(flaky_handle(0, loads), 1024));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["modelLoaded"], false);
    assert_eq!(json["backend"], "onnx");
    assert_eq!(json["version"], fabstir_caption_node::version::VERSION_NUMBER);
}

#[tokio::test]
async fn test_health_degraded_when_hosted_endpoint_unreachable() {
    let state = AppState::from_config(hosted_config("http://127.0.0.1:59999")).unwrap();
    let app = create_router(state);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["backend"], "hosted");
    assert_eq!(json["modelLoaded"], false);
    let issues = json["issues"].as_array().unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].as_str().unwrap().contains("127.0.0.1:59999"));
}

#[tokio::test]
async fn test_health_healthy_when_hosted_endpoint_reachable() {
    let endpoint = spawn_hosted_stub("unused").await;
    let app = create_router(AppState::from_config(hosted_config(&endpoint)).unwrap());

    let json = body_json(app.oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["backend"], "hosted");
    assert!(json.get("issues").is_none());
}

#[tokio::test]
async fn test_hosted_backend_captions_upload() {
    let endpoint = spawn_hosted_stub("a blue square").await;
    let app = create_router(AppState::from_config(hosted_config(&endpoint)).unwrap());

    let response = app
        .oneshot(caption_request(
            "/v1/caption",
            "square.png",
            "image/png",
            solid_png(64, 64),
            Some("20"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["caption"], "a blue square");
    assert_eq!(json["model"], "stub-vlm");
}

#[tokio::test]
async fn test_models_endpoint() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("x")));
    let response = app.oneshot(get("/v1/models")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["backend"], "onnx");
    assert_eq!(json["models"][0]["id"], "fixed-captioner");
    assert_eq!(json["models"][0]["loaded"], true);
}

#[tokio::test]
async fn test_models_endpoint_before_load() {
    let loads = Arc::new(AtomicUsize::new(0));
    let app = create_router(state_with_handle(flaky_handle(0, loads), 1024));
    let json = body_json(app.oneshot(get("/v1/models")).await.unwrap()).await;

    assert_eq!(json["models"][0]["id"], "blip-image-captioning-base");
    assert_eq!(json["models"][0]["loaded"], false);
}

#[tokio::test]
async fn test_version_endpoint() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("x")));
    let json = body_json(app.oneshot(get("/version")).await.unwrap()).await;
    assert_eq!(json["version"], fabstir_caption_node::version::VERSION_NUMBER);
    assert!(json["features"].as_array().unwrap().len() > 0);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("x")));
    let response = app.oneshot(get("/v1/describe-image")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "not_found");
}

#[tokio::test]
async fn test_caption_requires_post() {
    let app = app_with_provider(Arc::new(FixedCaptioner::new("x")));
    let response = app.oneshot(get("/v1/caption")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
