use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    routing::get,
};

use crate::{
    dto::products::{CountResponse, DeletedProduct, ProductForm, ProductFormSchema, ProductList},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, MaybeAuthUser},
    models::Product,
    response::ApiResponse,
    routes::params::{Pagination, SearchQuery},
    services::product_service,
    state::AppState,
    uploads::{IncomingImage, MAX_FILES},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/search-filter", get(search_products))
        .route("/myproducts/{user_id}", get(list_user_products))
        .route("/category/{category_id}", get(list_category_products))
        .route("/category/{category_id}/count", get(count_category_products))
        .route("/user/{user_id}/count", get(count_user_products))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/sold", get(list_sold_products))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::BadRequest(err.body_text())
}

/// Collects the product form. Repeated `categoryIds` fields are kept in
/// order; empty file inputs are skipped.
pub async fn read_form(mut multipart: Multipart) -> AppResult<ProductForm> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "images" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.is_empty() && file_name.as_deref().unwrap_or_default().is_empty() {
                continue;
            }
            if form.images.len() == MAX_FILES {
                return Err(AppError::BadRequest(format!(
                    "Too many files. Max {MAX_FILES} images."
                )));
            }
            form.images.push(IncomingImage {
                file_name,
                content_type,
                bytes,
            });
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "title" => form.title = Some(value),
            "description" => form.description = Some(value),
            "price" => form.price = Some(value),
            "statusId" => form.status_id = Some(value),
            "categoryIds" | "categoryIds[]" => {
                form.category_ids.get_or_insert_with(Vec::new).push(value)
            }
            "location_city" => form.location_city = Some(value),
            "location_country" => form.location_country = Some(value),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<u64>, Query, description = "Page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, default 10, max 100"),
    ),
    responses(
        (status = 200, description = "Active products, newest first", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_active(&*state.orm, viewer.user_id(), pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/search-filter",
    params(
        ("page" = Option<u64>, Query, description = "Page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, default 10, max 100"),
        ("q" = Option<String>, Query, description = "Matches title or description"),
        ("minPrice" = Option<f64>, Query, description = "Lower price bound"),
        ("maxPrice" = Option<f64>, Query, description = "Upper price bound"),
        ("location" = Option<String>, Query, description = "City substring"),
        ("sort" = Option<String>, Query, description = "field:direction, e.g. price:asc"),
        ("sortBy" = Option<String>, Query, description = "created_at, price or title"),
        ("sortDir" = Option<String>, Query, description = "asc or desc"),
        ("categoryId" = Option<i32>, Query, description = "Category id"),
    ),
    responses(
        (status = 200, description = "Matching active products", body = ApiResponse<ProductList>),
        (status = 400, description = "Invalid price values"),
        (status = 422, description = "Max price must be higher than min price"),
    ),
    tag = "Products"
)]
pub async fn search_products(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::search(&*state.orm, viewer.user_id(), query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/myproducts/{user_id}",
    params(
        ("user_id" = i32, Path, description = "Owner id"),
        ("page" = Option<u64>, Query, description = "Page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, default 10, max 100"),
    ),
    responses(
        (status = 200, description = "Active products of a user", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_user_products(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<i32>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp =
        product_service::list_by_owner(&*state.orm, viewer.user_id(), user_id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/sold",
    params(
        ("id" = i32, Path, description = "Owner id"),
        ("page" = Option<u64>, Query, description = "Page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, default 10, max 100"),
    ),
    responses(
        (status = 200, description = "Sold products of a user", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_sold_products(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<i32>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_sold(&*state.orm, viewer.user_id(), user_id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/category/{category_id}",
    params(
        ("category_id" = i32, Path, description = "Category id"),
        ("page" = Option<u64>, Query, description = "Page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Items per page, default 10, max 100"),
    ),
    responses(
        (status = 200, description = "Active products in a category", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_category_products(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(category_id): Path<i32>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp =
        product_service::list_by_category(&*state.orm, viewer.user_id(), category_id, pagination)
            .await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/category/{category_id}/count",
    params(("category_id" = i32, Path, description = "Category id")),
    responses(
        (status = 200, description = "Number of active products in a category", body = ApiResponse<CountResponse>)
    ),
    tag = "Products"
)]
pub async fn count_category_products(
    State(state): State<AppState>,
    Path(category_id): Path<i32>,
) -> AppResult<Json<ApiResponse<CountResponse>>> {
    Ok(Json(product_service::count_by_category(&*state.orm, category_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/products/user/{user_id}/count",
    params(("user_id" = i32, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Number of listings of a user, any status", body = ApiResponse<CountResponse>)
    ),
    tag = "Products"
)]
pub async fn count_user_products(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> AppResult<Json<ApiResponse<CountResponse>>> {
    Ok(Json(product_service::count_by_user(&*state.orm, user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<Product>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Product>>> {
    Ok(Json(product_service::get_product(&*state.orm, viewer.user_id(), id).await?))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body(content = ProductFormSchema, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Product created", body = ApiResponse<Product>),
        (status = 400, description = "Missing required fields."),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let form = read_form(multipart).await?;
    let resp = product_service::create_product(&*state.orm, &state.uploads, &user, form).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    request_body(content = ProductFormSchema, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<Product>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Product>>> {
    let form = read_form(multipart).await?;
    let resp =
        product_service::update_product(&*state.orm, &state.uploads, &user, id, form).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product soft-deleted", body = ApiResponse<DeletedProduct>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<DeletedProduct>>> {
    Ok(Json(product_service::delete_product(&*state.orm, &user, id).await?))
}
