//! Turns a validated [`ListingFilter`] plus an endpoint scope into product
//! queries, and eagerly attaches the relations every listing returns.

use chrono::Utc;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, LoaderTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};

use crate::{
    entity::{
        Categories, CategoryProducts, Favourites, Images, Locations, Users, categories,
        category_products, favourites, images, locations,
        products::{self, Column, Entity as Products},
        users,
    },
    error::{AppError, AppResult},
    models::{Product, ProductStatus},
    response::Meta,
    routes::params::{ListingFilter, Pagination, ProductSortBy, SortOrder},
};

/// Fixed restrictions an endpoint places on top of the user's filter.
/// Soft-deleted rows are always excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ListingScope {
    pub status: Option<ProductStatus>,
    pub owner_id: Option<i32>,
    pub favourited_by: Option<i32>,
}

impl ListingScope {
    pub fn active() -> Self {
        Self {
            status: Some(ProductStatus::Active),
            ..Self::default()
        }
    }

    pub fn sold() -> Self {
        Self {
            status: Some(ProductStatus::Sold),
            ..Self::default()
        }
    }

    pub fn any_status() -> Self {
        Self::default()
    }

    pub fn owned_by(mut self, user_id: i32) -> Self {
        self.owner_id = Some(user_id);
        self
    }

    pub fn favourited_by(mut self, user_id: i32) -> Self {
        self.favourited_by = Some(user_id);
        self
    }
}

/// Wraps a term for a substring ILIKE, escaping the pattern metacharacters.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub fn listing_condition(scope: &ListingScope, filter: &ListingFilter) -> Condition {
    let mut condition = Condition::all().add(Column::DeletedAt.is_null());

    if let Some(status) = scope.status {
        condition = condition.add(Column::StatusId.eq(status.id()));
    }

    if let Some(owner_id) = scope.owner_id {
        condition = condition.add(Column::UserId.eq(owner_id));
    }

    if let Some(user_id) = scope.favourited_by {
        condition = condition.add(
            Column::Id.in_subquery(
                Query::select()
                    .column(favourites::Column::ProductId)
                    .from(Favourites)
                    .and_where(favourites::Column::UserId.eq(user_id))
                    .to_owned(),
            ),
        );
    }

    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col((Products, Column::Title)).ilike(pattern.clone()))
                .add(Expr::col((Products, Column::Description)).ilike(pattern)),
        );
    }

    if let Some(min_price) = filter.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = filter.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if let Some(city) = filter.city.as_deref() {
        condition = condition.add(
            Column::LocationId.in_subquery(
                Query::select()
                    .column(locations::Column::Id)
                    .from(Locations)
                    .and_where(Expr::col((Locations, locations::Column::City)).ilike(like_pattern(city)))
                    .to_owned(),
            ),
        );
    }

    // A product matches when any of its category links points at the id.
    if let Some(category_id) = filter.category_id {
        condition = condition.add(
            Column::Id.in_subquery(
                Query::select()
                    .column(category_products::Column::ProductId)
                    .from(CategoryProducts)
                    .and_where(category_products::Column::CategoryId.eq(category_id))
                    .to_owned(),
            ),
        );
    }

    condition
}

pub fn listing_select(scope: &ListingScope, filter: &ListingFilter) -> Select<Products> {
    let column = match filter.sort.field {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Title => Column::Title,
    };
    let order = match filter.sort.order {
        SortOrder::Asc => Order::Asc,
        SortOrder::Desc => Order::Desc,
    };

    Products::find()
        .filter(listing_condition(scope, filter))
        .order_by(column, order.clone())
        .order_by(Column::Id, order)
}

pub async fn count<C: ConnectionTrait>(
    db: &C,
    scope: &ListingScope,
    filter: &ListingFilter,
) -> AppResult<u64> {
    let total = Products::find()
        .filter(listing_condition(scope, filter))
        .count(db)
        .await?;
    Ok(total)
}

/// One page of matching products with relations attached. Favourite flags
/// are left `false`; decoration is a separate step.
pub async fn fetch_page<C: ConnectionTrait>(
    db: &C,
    scope: &ListingScope,
    filter: &ListingFilter,
    pagination: &Pagination,
) -> AppResult<(Vec<Product>, Meta)> {
    let (page, limit, offset) = pagination.normalize();
    let total = count(db, scope, filter).await?;

    let rows = listing_select(scope, filter)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await?;

    tracing::debug!(total, page, limit, returned = rows.len(), "listing page fetched");

    let items = load_views(db, rows).await?;
    Ok((items, Meta::new(page, limit, total)))
}

/// Loads owner, location, images and categories for every row with one
/// query per relation.
pub async fn load_views<C: ConnectionTrait>(
    db: &C,
    rows: Vec<products::Model>,
) -> AppResult<Vec<Product>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let owners = rows.load_one(Users, db).await?;
    let locations = rows.load_one(Locations, db).await?;
    let images = rows
        .load_many(Images::find().order_by_asc(images::Column::Id), db)
        .await?;
    let categories = rows
        .load_many_to_many(
            Categories::find().order_by_asc(categories::Column::Id),
            CategoryProducts,
            db,
        )
        .await?;

    rows.into_iter()
        .zip(owners)
        .zip(locations)
        .zip(images)
        .zip(categories)
        .map(|((((row, owner), location), images), categories)| {
            product_view(row, owner, location, images, categories)
        })
        .collect()
}

pub fn product_view(
    row: products::Model,
    owner: Option<users::Model>,
    location: Option<locations::Model>,
    images: Vec<images::Model>,
    categories: Vec<categories::Model>,
) -> AppResult<Product> {
    let status = ProductStatus::try_from(row.status_id).map_err(|id| {
        AppError::Internal(anyhow::anyhow!("product {} has unknown status id {id}", row.id))
    })?;
    let owner = owner.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("product {} has no owner", row.id))
    })?;
    let location = location.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("product {} has no location", row.id))
    })?;

    Ok(Product {
        id: row.id,
        title: row.title,
        description: row.description,
        price: row.price,
        status: status.into(),
        location: location.into(),
        user: owner.into(),
        categories: categories.into_iter().map(Into::into).collect(),
        images: images.into_iter().map(Into::into).collect(),
        created_at: row.created_at.with_timezone(&Utc),
        updated_at: row.updated_at.with_timezone(&Utc),
        is_favorite: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::routes::params::SortSpec;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql(scope: ListingScope, filter: ListingFilter) -> String {
        listing_select(&scope, &filter)
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn every_scope_excludes_soft_deleted_rows() {
        for scope in [
            ListingScope::active(),
            ListingScope::sold(),
            ListingScope::any_status().owned_by(4),
        ] {
            let sql = sql(scope, ListingFilter::default());
            assert!(sql.contains(r#""products"."deleted_at" IS NULL"#), "{sql}");
        }
    }

    #[test]
    fn active_scope_filters_on_status_one() {
        let sql = sql(ListingScope::active(), ListingFilter::default());
        assert!(sql.contains(r#""products"."status_id" = 1"#), "{sql}");
    }

    #[test]
    fn default_order_is_newest_first_with_id_tiebreak() {
        let sql = sql(ListingScope::active(), ListingFilter::default());
        assert!(
            sql.ends_with(r#"ORDER BY "products"."created_at" DESC, "products"."id" DESC"#),
            "{sql}"
        );
    }

    #[test]
    fn search_matches_title_or_description_case_insensitively() {
        let filter = ListingFilter {
            search: Some("lamp".into()),
            ..ListingFilter::default()
        };
        let sql = sql(ListingScope::active(), filter);
        assert!(sql.contains(r#""products"."title" ILIKE '%lamp%'"#), "{sql}");
        assert!(sql.contains(r#""products"."description" ILIKE '%lamp%'"#), "{sql}");
        assert!(sql.contains(" OR "), "{sql}");
    }

    #[test]
    fn price_bounds_and_sort_are_applied() {
        let filter = ListingFilter {
            min_price: Some(5.0),
            max_price: Some(20.0),
            sort: SortSpec::parse(Some("price:asc"), None, None),
            ..ListingFilter::default()
        };
        let sql = sql(ListingScope::active(), filter);
        assert!(sql.contains(r#""products"."price" >= 5"#), "{sql}");
        assert!(sql.contains(r#""products"."price" <= 20"#), "{sql}");
        assert!(sql.contains(r#"ORDER BY "products"."price" ASC"#), "{sql}");
    }

    #[test]
    fn category_filter_is_an_existence_check_on_the_join_table() {
        let filter = ListingFilter {
            category_id: Some(7),
            ..ListingFilter::default()
        };
        let sql = sql(ListingScope::active(), filter);
        assert!(sql.contains(r#""products"."id" IN (SELECT "product_id" FROM "category_products""#), "{sql}");
        assert!(sql.contains(r#""category_id" = 7"#), "{sql}");
    }

    #[test]
    fn city_filter_uses_location_subquery() {
        let filter = ListingFilter {
            city: Some("Ljub".into()),
            ..ListingFilter::default()
        };
        let sql = sql(ListingScope::active(), filter);
        assert!(sql.contains(r#""products"."location_id" IN (SELECT "id" FROM "locations""#), "{sql}");
        assert!(sql.contains("ILIKE '%Ljub%'"), "{sql}");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }

    fn product_row(id: i32) -> products::Model {
        let now = Utc::now().fixed_offset();
        products::Model {
            id,
            title: format!("Lamp {id}"),
            description: "Warm light".into(),
            price: 12.0,
            user_id: 1,
            status_id: 1,
            location_id: 4,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn owner() -> users::Model {
        let now = Utc::now().fixed_offset();
        users::Model {
            id: 1,
            email: "seller@example.com".into(),
            google_id: None,
            username: Some("seller".into()),
            email_verified: true,
            first_name: None,
            last_name: None,
            phone_number: None,
            profile_picture_path: None,
            password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn second_page_is_bounded_by_limit_and_counts_pages() {
        let db = sea_orm::MockDatabase::new(DbBackend::Postgres)
            .append_query_results([[BTreeMap::from([(
                "num_items",
                sea_orm::Value::BigInt(Some(5)),
            )])]])
            .append_query_results([vec![product_row(3), product_row(4)]])
            .append_query_results([[owner()]])
            .append_query_results([[locations::Model {
                id: 4,
                city: "Ljubljana".into(),
                country: Some("Slovenia".into()),
            }]])
            .append_query_results([Vec::<images::Model>::new()])
            .append_query_results([[category_products::Model {
                product_id: 3,
                category_id: 7,
            }]])
            .append_query_results([[categories::Model {
                id: 7,
                name: "lamps".into(),
            }]])
            .into_connection();

        let (items, meta) = fetch_page(
            &db,
            &ListingScope::active(),
            &ListingFilter::default(),
            &Pagination::new(2, 2),
        )
        .await
        .unwrap();

        assert!(items.len() as u64 <= meta.limit);
        assert_eq!(items.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!((meta.page, meta.limit, meta.total, meta.pages), (2, 2, 5, 3));
        assert_eq!(items[0].categories.len(), 1);
        assert!(items[1].categories.is_empty());

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 7);
        let page_query = format!("{:?}", log[1]);
        assert!(page_query.contains("LIMIT $2 OFFSET $3"), "{page_query}");
        assert!(page_query.contains("BigUnsigned(Some(2))"), "{page_query}");
    }

    #[tokio::test]
    async fn empty_page_issues_no_relation_queries() {
        let db = sea_orm::MockDatabase::new(DbBackend::Postgres).into_connection();
        let views = load_views(&db, Vec::new()).await.unwrap();
        assert!(views.is_empty());
        assert!(db.into_transaction_log().is_empty());
    }
}
