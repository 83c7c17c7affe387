mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;

/// Router over a pool that never connects; every request here must be
/// answered before storage is touched.
fn app() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy(&common::config().database.url)
        .unwrap();
    common::app(pool)
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    common::send(&app(), request).await
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let request = Request::get("/api/nowhere").body(Body::empty()).unwrap();
    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn current_user_requires_token() {
    let request = Request::get("/api/user").body(Body::empty()).unwrap();
    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let request = Request::get("/api/credits")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let request = Request::get("/api/admin/stats").body(Body::empty()).unwrap();
    let (status, _) = send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_is_validated() {
    let payload = json!({
        "user": { "username": "ada", "email": "not-an-email", "password": "short" }
    });
    let request = Request::post("/api/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let request = Request::post("/api/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"id":"evt_1","type":"checkout.session.completed"}"#))
        .unwrap();
    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("missing webhook signature"));
}

#[tokio::test]
async fn webhook_with_forged_signature_is_rejected() {
    let now = chrono::Utc::now().timestamp();
    let request = Request::post("/api/payments/webhook")
        .header("stripe-signature", format!("t={now},v1=deadbeef"))
        .body(Body::from(r#"{"id":"evt_1","type":"checkout.session.completed"}"#))
        .unwrap();
    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid webhook signature"));
}
