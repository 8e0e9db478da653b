mod common;

use axum::http::StatusCode;
use common::{test_config, TestApp};

#[tokio::test]
async fn health_check_reports_the_store() {
    let app = TestApp::spawn().await;

    let res = app.get("/health").await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "healthy");
    assert_eq!(res.body["service"], "tenant-auth-test");
    assert_eq!(res.body["checks"]["mongodb"], "up");
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let app = TestApp::spawn().await;

    let res = app
        .request(
            axum::http::Method::GET,
            "/health",
            None,
            &[("x-request-id", "req-123")],
        )
        .await;

    assert_eq!(res.headers.get("x-request-id").unwrap(), "req-123");
    assert_eq!(res.headers.get("x-content-type-options").unwrap(), "nosniff");
}

#[tokio::test]
async fn metrics_are_exposed_in_prometheus_format() {
    tenant_auth::services::metrics::init_metrics().unwrap();
    let app = TestApp::spawn().await;
    app.get("/health").await;

    let res = app.get("/metrics").await;

    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text.contains("http_requests_total"));
}

#[tokio::test]
async fn openapi_document_follows_swagger_setting() {
    let app = TestApp::spawn().await;
    let res = app.get("/.well-known/openapi.json").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["paths"]["/organizations/register"].is_object());
    assert!(res.body["paths"]["/auth/login"].is_object());

    let mut config = test_config();
    config.swagger.enabled = false;
    let app = TestApp::spawn_with(config).await;
    let res = app.get("/.well-known/openapi.json").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
