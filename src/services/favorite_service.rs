use std::collections::HashSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    entity::{
        Favourites, Products,
        favourites::{ActiveModel as FavouriteActive, Column as FavCol},
        products::Column as ProdCol,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_self},
    models::{Favourite, Product},
    response::ApiResponse,
    routes::params::{ListingFilter, Pagination},
    services::listing::{self, ListingScope},
    dto::products::ProductList,
};

/// Sets `is_favorite` on each product for `viewer`. Without a viewer every
/// flag is `false` and the store is not touched; with one, a single lookup
/// covers the whole page.
pub async fn decorate_favorites<C: ConnectionTrait>(
    db: &C,
    mut products: Vec<Product>,
    viewer: Option<i32>,
) -> AppResult<Vec<Product>> {
    let Some(user_id) = viewer else {
        for product in &mut products {
            product.is_favorite = false;
        }
        return Ok(products);
    };
    if products.is_empty() {
        return Ok(products);
    }

    let ids: Vec<i32> = products.iter().map(|p| p.id).collect();
    let favourite_ids: HashSet<i32> = Favourites::find()
        .filter(FavCol::UserId.eq(user_id))
        .filter(FavCol::ProductId.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|f| f.product_id)
        .collect();

    for product in &mut products {
        product.is_favorite = favourite_ids.contains(&product.id);
    }
    Ok(products)
}

pub async fn list_favorites(
    db: &DatabaseConnection,
    user_id: i32,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let scope = ListingScope::active().favourited_by(user_id);
    let (mut items, meta) =
        listing::fetch_page(db, &scope, &ListingFilter::default(), &pagination).await?;
    for item in &mut items {
        item.is_favorite = true;
    }
    Ok(ApiResponse::success("OK", ProductList { items }, Some(meta)))
}

pub async fn add_favorite(
    db: &DatabaseConnection,
    user: &AuthUser,
    user_id: i32,
    product_id: i32,
) -> AppResult<ApiResponse<Favourite>> {
    ensure_self(user, user_id)?;

    let product = Products::find_by_id(product_id)
        .filter(ProdCol::DeletedAt.is_null())
        .one(db)
        .await?;
    if product.is_none() {
        return Err(AppError::not_found("Product"));
    }

    let existing = Favourites::find()
        .filter(FavCol::UserId.eq(user_id))
        .filter(FavCol::ProductId.eq(product_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Product already in favourites".into()));
    }

    let active = FavouriteActive {
        id: NotSet,
        user_id: Set(user_id),
        product_id: Set(product_id),
        created_at: NotSet,
    };
    // A concurrent insert of the same pair trips the unique constraint.
    let favourite = active.insert(db).await.map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Product already in favourites".into())
        }
        _ => AppError::OrmError(err),
    })?;

    tracing::info!(user_id, product_id, "favourite added");

    Ok(ApiResponse::success(
        "Added to favourites",
        favourite.into(),
        None,
    ))
}

pub async fn remove_favorite(
    db: &DatabaseConnection,
    user: &AuthUser,
    user_id: i32,
    product_id: i32,
) -> AppResult<ApiResponse<Favourite>> {
    ensure_self(user, user_id)?;

    let favourite = Favourites::find()
        .filter(FavCol::UserId.eq(user_id))
        .filter(FavCol::ProductId.eq(product_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Favourite"))?;

    Favourites::delete_by_id(favourite.id).exec(db).await?;

    tracing::info!(user_id, product_id, "favourite removed");

    Ok(ApiResponse::success(
        "Removed from favourites",
        favourite.into(),
        None,
    ))
}
