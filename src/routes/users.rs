use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::{
        products::ProductList,
        users::{CreateUserRequest, DeletedUser, UpdateUserRequest},
    },
    error::AppResult,
    middleware::auth::{AuthUser, ensure_self},
    models::{Favourite, UserProfile},
    response::ApiResponse,
    routes::params::Pagination,
    services::{favorite_service, user_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/{id}/favorites", get(list_favorites))
        .route(
            "/{id}/favorites/{product_id}",
            post(add_favorite).delete(remove_favorite),
        )
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "All users", body = ApiResponse<Vec<UserProfile>>)),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<UserProfile>>>> {
    Ok(Json(user_service::list_users(&*state.orm).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = ApiResponse<UserProfile>),
        (status = 404, description = "User not found"),
    ),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    Ok(Json(user_service::get_user(&*state.orm, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserProfile>),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email is already taken"),
    ),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserProfile>>)> {
    let resp = user_service::create_user(&*state.orm, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = ApiResponse<UserProfile>),
        (status = 403, description = "Not this user"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    Ok(Json(user_service::update_user(&*state.orm, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = ApiResponse<DeletedUser>),
        (status = 403, description = "Not this user"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User still has listings"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<DeletedUser>>> {
    Ok(Json(user_service::delete_user(&*state.orm, &user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}/favorites",
    params(
        ("id" = i32, Path, description = "User id"),
        ("page" = Option<u64>, Query, description = "Page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, default 10, max 100"),
    ),
    responses(
        (status = 200, description = "Favourite active products", body = ApiResponse<ProductList>),
        (status = 403, description = "Not this user"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Favorites"
)]
pub async fn list_favorites(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    ensure_self(&user, id)?;
    Ok(Json(favorite_service::list_favorites(&*state.orm, id, pagination).await?))
}

#[utoipa::path(
    post,
    path = "/api/users/{id}/favorites/{product_id}",
    params(
        ("id" = i32, Path, description = "User id"),
        ("product_id" = i32, Path, description = "Product id"),
    ),
    responses(
        (status = 201, description = "Added to favourites", body = ApiResponse<Favourite>),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Product already in favourites"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Favorites"
)]
pub async fn add_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(i32, i32)>,
) -> AppResult<(StatusCode, Json<ApiResponse<Favourite>>)> {
    let resp = favorite_service::add_favorite(&*state.orm, &user, id, product_id).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}/favorites/{product_id}",
    params(
        ("id" = i32, Path, description = "User id"),
        ("product_id" = i32, Path, description = "Product id"),
    ),
    responses(
        (status = 200, description = "Removed from favourites", body = ApiResponse<Favourite>),
        (status = 404, description = "Favourite not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Favorites"
)]
pub async fn remove_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(i32, i32)>,
) -> AppResult<Json<ApiResponse<Favourite>>> {
    Ok(Json(
        favorite_service::remove_favorite(&*state.orm, &user, id, product_id).await?,
    ))
}
