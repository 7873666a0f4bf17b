use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};

use crate::{
    dto::auth::{GoogleCallbackRequest, SessionUser},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::auth_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/google/callback", post(google_callback))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

#[utoipa::path(
    post,
    path = "/api/auth/google/callback",
    request_body = GoogleCallbackRequest,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = ApiResponse<SessionUser>),
        (status = 400, description = "ID token required"),
        (status = 401, description = "Authentication failed"),
    ),
    tag = "Auth"
)]
pub async fn google_callback(
    State(state): State<AppState>,
    Json(payload): Json<GoogleCallbackRequest>,
) -> AppResult<impl IntoResponse> {
    let (session, token) = auth_service::google_login(
        &*state.orm,
        state.google.as_ref(),
        &state.config.jwt_secret,
        payload.code.as_deref(),
    )
    .await?;

    let cookie = auth_service::session_cookie(&token, state.config.production);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(ApiResponse::success("Login successful", session, None)),
    ))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<SessionUser>),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<SessionUser>>> {
    Ok(Json(auth_service::me(&*state.orm, &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared", body = ApiResponse<serde_json::Value>),
    ),
    tag = "Auth"
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = auth_service::clear_session_cookie(state.config.production);
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(ApiResponse::success("Logged out", serde_json::json!({}), None)),
    )
}
