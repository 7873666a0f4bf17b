use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use local_marketplace_api::{
    app::build_router,
    config::AppConfig,
    entity::users,
    services::{
        auth_service::issue_token,
        google::{GoogleProfile, GoogleVerifier},
    },
    state::AppState,
    uploads::UploadStore,
};
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "api-test-secret";

struct RejectAll;

#[async_trait]
impl GoogleVerifier for RejectAll {
    async fn verify(&self, _id_token: &str) -> anyhow::Result<GoogleProfile> {
        anyhow::bail!("no google in tests")
    }
}

// Every request here is answered before the store is queried.
fn app() -> Router {
    let config = AppConfig {
        database_url: "postgres://unused".into(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: SECRET.into(),
        google_client_id: "test-client".into(),
        upload_dir: std::env::temp_dir().display().to_string(),
        cors_origins: vec!["http://localhost:5173".into()],
        production: false,
        max_body_bytes: 1024 * 1024,
    };
    build_router(AppState {
        orm: Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection()),
        uploads: UploadStore::new(&config.upload_dir),
        google: Arc::new(RejectAll),
        config: Arc::new(config),
    })
}

fn token_for(user_id: i32) -> String {
    let now = Utc::now().fixed_offset();
    let user = users::Model {
        id: user_id,
        email: format!("user{user_id}@example.com"),
        google_id: None,
        username: None,
        email_verified: true,
        first_name: None,
        last_name: None,
        phone_number: None,
        profile_picture_path: None,
        password_hash: None,
        created_at: now,
        updated_at: now,
    };
    issue_token(SECRET, &user).expect("token")
}

async fn send(request: Request<Body>) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = app().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, headers)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn unknown_paths_return_json_404_with_the_path() {
    let (status, body, _) = send(get("/api/nothing-here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["path"], "/api/nothing-here");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let (status, _, headers) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn inverted_price_bounds_are_unprocessable() {
    let (status, body, _) =
        send(get("/api/products/search-filter?minPrice=10&maxPrice=5")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Max price must be higher than min price");
}

#[tokio::test]
async fn malformed_or_negative_prices_are_bad_requests() {
    let (status, body, _) = send(get("/api/products/search-filter?minPrice=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid price values");

    let (status, body, _) = send(get("/api/products/search-filter?maxPrice=-3")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Prices must be non-negative");
}

#[tokio::test]
async fn me_requires_a_session() {
    let (status, body, _) = send(get("/api/auth/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");

    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn callback_without_token_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/google/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body, _) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ID token required");
}

#[tokio::test]
async fn rejected_google_token_is_unauthorized() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/google/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"code":"forged"}"#))
        .unwrap();
    let (status, body, _) = send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication failed");
}

#[tokio::test]
async fn logout_expires_the_session_cookie() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .body(Body::empty())
        .unwrap();
    let (status, _, headers) = send(request).await;
    assert_eq!(status, StatusCode::OK);
    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session="), "{cookie}");
    assert!(cookie.contains("Max-Age=0"), "{cookie}");
}

#[tokio::test]
async fn favouriting_for_another_user_is_forbidden() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/users/2/favorites/5")
        .header(header::COOKIE, format!("session={}", token_for(1)))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn favourites_are_private_to_their_owner() {
    let (status, body, _) = send(get("/api/users/2/favorites")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");

    let request = Request::builder()
        .uri("/api/users/2/favorites")
        .header(header::COOKIE, format!("session={}", token_for(1)))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn creating_a_product_requires_a_session() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/products")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
        .body(Body::from("--X--\r\n"))
        .unwrap();
    let (status, _, _) = send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn incomplete_product_form_is_rejected() {
    let body = "--X\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
Lamp\r\n\
--X--\r\n";
    let request = Request::builder()
        .method("POST")
        .uri("/api/products")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(1)))
        .body(Body::from(body))
        .unwrap();
    let (status, body, _) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields.");
}
