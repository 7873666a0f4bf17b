use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    dto::products::{CountResponse, DeletedProduct, ProductForm, ProductList},
    entity::{
        Categories, CategoryProducts, Images, Locations, Products, categories, category_products,
        images,
        products::{ActiveModel as ProductActive, Column as ProdCol, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Product, ProductStatus},
    response::ApiResponse,
    routes::params::{ListingFilter, Pagination, SearchQuery, parse_category_ids},
    services::{
        favorite_service::decorate_favorites,
        listing::{self, ListingScope},
        location_service,
    },
    uploads::UploadStore,
};

/// Validated fields of a new listing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub status: ProductStatus,
    pub category_ids: Vec<i32>,
    pub city: String,
    pub country: Option<String>,
}

/// Partial update parsed from a form. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub status: Option<ProductStatus>,
    pub category_ids: Option<Vec<i32>>,
    pub city: Option<String>,
    pub country: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

pub fn parse_price(raw: &str) -> AppResult<f64> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(AppError::BadRequest(
            "Price must be a non-negative number".into(),
        )),
    }
}

pub fn parse_status(raw: &str) -> AppResult<ProductStatus> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .and_then(|id| ProductStatus::try_from(id).ok())
        .ok_or_else(|| AppError::BadRequest("Invalid statusId".into()))
}

fn form_category_ids(form: &ProductForm) -> Option<Vec<i32>> {
    form.category_ids
        .as_ref()
        .map(|raw| parse_category_ids(raw.iter().map(String::as_str)))
}

impl NewProduct {
    pub fn from_form(form: &ProductForm) -> AppResult<Self> {
        let category_ids = form_category_ids(form).unwrap_or_default();

        let (Some(title), Some(description), Some(status_id), Some(city), Some(price)) = (
            present(&form.title),
            present(&form.description),
            present(&form.status_id),
            present(&form.location_city),
            present(&form.price),
        ) else {
            return Err(AppError::BadRequest("Missing required fields.".into()));
        };
        if category_ids.is_empty() {
            return Err(AppError::BadRequest("Missing required fields.".into()));
        }

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            price: parse_price(price)?,
            status: parse_status(status_id)?,
            category_ids,
            city: city.to_string(),
            country: form.location_country.clone().filter(|c| !c.is_empty()),
        })
    }
}

impl ProductChanges {
    pub fn from_form(form: &ProductForm) -> AppResult<Self> {
        Ok(Self {
            title: form.title.clone(),
            description: form.description.clone(),
            price: present(&form.price).map(parse_price).transpose()?,
            status: present(&form.status_id).map(parse_status).transpose()?,
            category_ids: form_category_ids(form),
            city: form.location_city.clone(),
            country: form.location_country.clone(),
        })
    }

    fn touches_location(&self) -> bool {
        self.city.is_some() || self.country.is_some()
    }
}

async fn ensure_categories<C: ConnectionTrait>(db: &C, ids: &[i32]) -> AppResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found = Categories::find()
        .filter(categories::Column::Id.is_in(ids.iter().copied()))
        .count(db)
        .await?;
    if found != ids.len() as u64 {
        return Err(AppError::BadRequest("Unknown category id".into()));
    }
    Ok(())
}

async fn link_categories<C: ConnectionTrait>(db: &C, product_id: i32, ids: &[i32]) -> AppResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let links = ids.iter().map(|&category_id| category_products::ActiveModel {
        product_id: Set(product_id),
        category_id: Set(category_id),
    });
    CategoryProducts::insert_many(links)
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Stores image rows in upload order; the first is primary when asked.
async fn attach_images<C: ConnectionTrait>(
    db: &C,
    product_id: i32,
    urls: &[String],
    first_is_primary: bool,
) -> AppResult<()> {
    if urls.is_empty() {
        return Ok(());
    }
    let rows = urls.iter().enumerate().map(|(index, url)| images::ActiveModel {
        id: NotSet,
        product_id: Set(product_id),
        url: Set(url.clone()),
        is_primary: Set(first_is_primary && index == 0),
    });
    Images::insert_many(rows).exec_without_returning(db).await?;
    Ok(())
}

async fn find_visible<C: ConnectionTrait>(db: &C, id: i32) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .filter(ProdCol::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))
}

fn ensure_owner(product: &ProductModel, user: &AuthUser) -> AppResult<()> {
    if product.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

async fn single_view<C: ConnectionTrait>(db: &C, row: ProductModel) -> AppResult<Product> {
    let id = row.id;
    listing::load_views(db, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("product {id} vanished while loading")))
}

async fn listing_response(
    db: &DatabaseConnection,
    viewer: Option<i32>,
    scope: ListingScope,
    filter: ListingFilter,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let (items, meta) = listing::fetch_page(db, &scope, &filter, &pagination).await?;
    let items = decorate_favorites(db, items, viewer).await?;
    Ok(ApiResponse::success("OK", ProductList { items }, Some(meta)))
}

pub async fn list_active(
    db: &DatabaseConnection,
    viewer: Option<i32>,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    listing_response(db, viewer, ListingScope::active(), ListingFilter::default(), pagination).await
}

pub async fn search(
    db: &DatabaseConnection,
    viewer: Option<i32>,
    query: SearchQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (pagination, filter) = query.into_filter()?;
    listing_response(db, viewer, ListingScope::active(), filter, pagination).await
}

pub async fn list_by_owner(
    db: &DatabaseConnection,
    viewer: Option<i32>,
    owner_id: i32,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let scope = ListingScope::active().owned_by(owner_id);
    listing_response(db, viewer, scope, ListingFilter::default(), pagination).await
}

pub async fn list_sold(
    db: &DatabaseConnection,
    viewer: Option<i32>,
    owner_id: i32,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let scope = ListingScope::sold().owned_by(owner_id);
    listing_response(db, viewer, scope, ListingFilter::default(), pagination).await
}

pub async fn list_by_category(
    db: &DatabaseConnection,
    viewer: Option<i32>,
    category_id: i32,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    let filter = ListingFilter {
        category_id: Some(category_id),
        ..ListingFilter::default()
    };
    listing_response(db, viewer, ListingScope::active(), filter, pagination).await
}

pub async fn count_by_category(
    db: &DatabaseConnection,
    category_id: i32,
) -> AppResult<ApiResponse<CountResponse>> {
    let filter = ListingFilter {
        category_id: Some(category_id),
        ..ListingFilter::default()
    };
    let count = listing::count(db, &ListingScope::active(), &filter).await?;
    Ok(ApiResponse::success("OK", CountResponse { count }, None))
}

pub async fn count_by_user(
    db: &DatabaseConnection,
    user_id: i32,
) -> AppResult<ApiResponse<CountResponse>> {
    let scope = ListingScope::any_status().owned_by(user_id);
    let count = listing::count(db, &scope, &ListingFilter::default()).await?;
    Ok(ApiResponse::success("OK", CountResponse { count }, None))
}

pub async fn get_product(
    db: &DatabaseConnection,
    viewer: Option<i32>,
    id: i32,
) -> AppResult<ApiResponse<Product>> {
    let row = find_visible(db, id).await?;
    let product = single_view(db, row).await?;
    let product = decorate_favorites(db, vec![product], viewer)
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found("Product"))?;
    Ok(ApiResponse::success("OK", product, None))
}

/// Writes the product, its location, category links and image rows in one
/// transaction.
pub async fn insert_product<C: TransactionTrait>(
    db: &C,
    owner_id: i32,
    new: &NewProduct,
    image_urls: &[String],
) -> AppResult<ProductModel> {
    let txn = db.begin().await?;

    ensure_categories(&txn, &new.category_ids).await?;
    let location =
        location_service::find_or_create(&txn, &new.city, new.country.as_deref()).await?;

    let row = ProductActive {
        id: NotSet,
        title: Set(new.title.clone()),
        description: Set(new.description.clone()),
        price: Set(new.price),
        user_id: Set(owner_id),
        status_id: Set(new.status.id()),
        location_id: Set(location.id),
        deleted_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    link_categories(&txn, row.id, &new.category_ids).await?;
    attach_images(&txn, row.id, image_urls, true).await?;

    txn.commit().await?;
    Ok(row)
}

pub async fn create_product(
    db: &DatabaseConnection,
    store: &UploadStore,
    user: &AuthUser,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    let new = NewProduct::from_form(&form)?;
    let urls = store.save(&form.images).await?;

    let row = match insert_product(db, user.user_id, &new, &urls).await {
        Ok(row) => row,
        Err(err) => {
            store.discard(&urls).await;
            return Err(err);
        }
    };

    tracing::info!(
        product_id = row.id,
        user_id = user.user_id,
        images = urls.len(),
        "product created"
    );

    let product = single_view(db, row).await?;
    Ok(ApiResponse::success("Product created", product, None))
}

/// Applies a partial update to a product the caller owns.
pub async fn apply_changes<C: TransactionTrait>(
    db: &C,
    existing: ProductModel,
    changes: &ProductChanges,
    image_urls: &[String],
) -> AppResult<ProductModel> {
    let txn = db.begin().await?;
    let product_id = existing.id;
    let location_id = existing.location_id;
    let mut active: ProductActive = existing.into();

    if let Some(title) = &changes.title {
        active.title = Set(title.clone());
    }
    if let Some(description) = &changes.description {
        active.description = Set(description.clone());
    }
    if let Some(price) = changes.price {
        active.price = Set(price);
    }
    if let Some(status) = changes.status {
        active.status_id = Set(status.id());
    }

    if changes.touches_location() {
        let current = Locations::find_by_id(location_id).one(&txn).await?;
        let city = match &changes.city {
            Some(city) => city.clone(),
            None => current.as_ref().map(|l| l.city.clone()).unwrap_or_default(),
        };
        let country = match &changes.country {
            Some(country) => Some(country.clone()),
            None => current.and_then(|l| l.country),
        };
        if city.is_empty() {
            return Err(AppError::BadRequest("City is required for location.".into()));
        }
        let location = location_service::find_or_create(&txn, &city, country.as_deref()).await?;
        active.location_id = Set(location.id);
    }

    if let Some(ids) = &changes.category_ids {
        ensure_categories(&txn, ids).await?;
        CategoryProducts::delete_many()
            .filter(category_products::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        link_categories(&txn, product_id, ids).await?;
    }

    if !image_urls.is_empty() {
        let existing_images = Images::find()
            .filter(images::Column::ProductId.eq(product_id))
            .count(&txn)
            .await?;
        attach_images(&txn, product_id, image_urls, existing_images == 0).await?;
    }

    active.updated_at = Set(Utc::now().fixed_offset());
    let row = active.update(&txn).await?;

    txn.commit().await?;
    Ok(row)
}

pub async fn update_product(
    db: &DatabaseConnection,
    store: &UploadStore,
    user: &AuthUser,
    id: i32,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    let existing = find_visible(db, id).await?;
    ensure_owner(&existing, user)?;
    let changes = ProductChanges::from_form(&form)?;

    let urls = store.save(&form.images).await?;
    let row = match apply_changes(db, existing, &changes, &urls).await {
        Ok(row) => row,
        Err(err) => {
            store.discard(&urls).await;
            return Err(err);
        }
    };

    tracing::info!(product_id = id, user_id = user.user_id, "product updated");

    let product = single_view(db, row).await?;
    let product = decorate_favorites(db, vec![product], Some(user.user_id))
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found("Product"))?;
    Ok(ApiResponse::success("Product updated", product, None))
}

/// Soft-deletes a product the caller owns and drops its category links.
pub async fn delete_product<C: TransactionTrait>(
    db: &C,
    user: &AuthUser,
    id: i32,
) -> AppResult<ApiResponse<DeletedProduct>> {
    let txn = db.begin().await?;

    let existing = find_visible(&txn, id).await?;
    ensure_owner(&existing, user)?;

    CategoryProducts::delete_many()
        .filter(category_products::Column::ProductId.eq(id))
        .exec(&txn)
        .await?;

    let now = Utc::now().fixed_offset();
    let mut active: ProductActive = existing.into();
    active.deleted_at = Set(Some(now));
    active.updated_at = Set(now);
    let row = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(product_id = id, user_id = user.user_id, "product soft-deleted");

    Ok(ApiResponse::success(
        "Product soft-deleted successfully",
        DeletedProduct {
            id: row.id,
            title: row.title,
            deleted_at: now.with_timezone(&Utc),
        },
        None,
    ))
}
