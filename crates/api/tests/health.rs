//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, build_test_app};
use tower::ServiceExt;

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = build_test_app();
    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["store_healthy"], true);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app();
    let response = app.get("/this-route-does-not-exist", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app();
    let response = app.get("/health", None).await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    // A generated UUID: 36 chars with hyphens.
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn cors_preflight_allows_only_read_and_create() {
    let app = build_test_app();
    let origin = app.config.cors_origins[0].clone();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/complete-event")
        .header("origin", &origin)
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], origin.as_str());
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("GET"));
    assert!(methods.contains("POST"));
    assert!(!methods.contains("DELETE"));
    assert!(!methods.contains("PUT"));
}
