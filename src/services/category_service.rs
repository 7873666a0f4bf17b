use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, DbErr, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, Set, SqlErr, Statement,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    dto::categories::CategoryRequest,
    entity::{
        Categories, CategoryProducts,
        categories::{ActiveModel as CategoryActive, Column as CatCol},
        category_products,
    },
    error::{AppError, AppResult},
    models::{Category, CategoryWithCount},
    response::ApiResponse,
};

const CATEGORY_COUNTS_SQL: &str = r#"
    SELECT c.id, c.name, COUNT(p.id)::BIGINT AS product_count
    FROM categories c
    LEFT JOIN category_products cp ON cp.category_id = c.id
    LEFT JOIN products p ON p.id = cp.product_id AND p.deleted_at IS NULL
    GROUP BY c.id, c.name
    ORDER BY c.id
"#;

#[derive(Debug, FromQueryResult)]
struct CategoryCountRow {
    id: i32,
    name: String,
    product_count: i64,
}

fn required_name(payload: &CategoryRequest) -> AppResult<String> {
    payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("Category name is required".into()))
}

fn name_taken(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Category already exists".into())
        }
        _ => AppError::OrmError(err),
    }
}

async fn name_in_use<C: ConnectionTrait>(db: &C, name: &str, except: Option<i32>) -> AppResult<bool> {
    let mut query = Categories::find().filter(CatCol::Name.eq(name));
    if let Some(id) = except {
        query = query.filter(CatCol::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

/// Every category with the number of visible products linked to it.
pub async fn list_categories<C: ConnectionTrait>(
    db: &C,
) -> AppResult<ApiResponse<Vec<CategoryWithCount>>> {
    let rows = CategoryCountRow::find_by_statement(Statement::from_string(
        DbBackend::Postgres,
        CATEGORY_COUNTS_SQL,
    ))
    .all(db)
    .await?;

    let data = rows
        .into_iter()
        .map(|row| CategoryWithCount {
            id: row.id,
            name: row.name,
            product_count: row.product_count,
        })
        .collect();
    Ok(ApiResponse::success("OK", data, None))
}

pub async fn get_category<C: ConnectionTrait>(db: &C, id: i32) -> AppResult<ApiResponse<Category>> {
    let category = Categories::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;
    Ok(ApiResponse::success("OK", category.into(), None))
}

pub async fn create_category<C: ConnectionTrait>(
    db: &C,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    let name = required_name(&payload)?;
    if name_in_use(db, &name, None).await? {
        return Err(AppError::Conflict("Category already exists".into()));
    }

    let category = CategoryActive {
        id: NotSet,
        name: Set(name),
    }
    .insert(db)
    .await
    .map_err(name_taken)?;

    tracing::info!(category_id = category.id, "category created");
    Ok(ApiResponse::success("Category created", category.into(), None))
}

pub async fn update_category<C: ConnectionTrait>(
    db: &C,
    id: i32,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    let name = required_name(&payload)?;
    let existing = Categories::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    if name_in_use(db, &name, Some(id)).await? {
        return Err(AppError::Conflict("Category already exists".into()));
    }

    let mut active: CategoryActive = existing.into();
    active.name = Set(name);
    let category = active.update(db).await.map_err(name_taken)?;

    Ok(ApiResponse::success("Category updated", category.into(), None))
}

/// Refuses while any product, deleted or not, still links to the category.
pub async fn delete_category<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> AppResult<ApiResponse<Category>> {
    let existing = Categories::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    let linked = CategoryProducts::find()
        .filter(category_products::Column::CategoryId.eq(id))
        .count(db)
        .await?;
    if linked > 0 {
        return Err(AppError::Conflict(
            "Category is still assigned to products".into(),
        ));
    }

    Categories::delete_by_id(id).exec(db).await?;
    tracing::info!(category_id = id, "category deleted");

    Ok(ApiResponse::success("Category deleted", existing.into(), None))
}
