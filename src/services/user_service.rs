use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use sea_orm::ActiveValue::NotSet;
use validator::Validate;

use crate::{
    dto::users::{CreateUserRequest, DeletedUser, UpdateUserRequest},
    entity::{
        Products, Users, products,
        users::{ActiveModel as UserActive, Column as UserCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_self},
    models::UserProfile,
    response::ApiResponse,
};

fn email_taken(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Email is already taken".into())
        }
        _ => AppError::OrmError(err),
    }
}

const HAS_LISTINGS: &str = "User still has listings";

fn listings_remain(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => AppError::Conflict(HAS_LISTINGS.into()),
        _ => AppError::OrmError(err),
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

async fn email_in_use<C: ConnectionTrait>(db: &C, email: &str, except: Option<i32>) -> AppResult<bool> {
    let mut query = Users::find().filter(UserCol::Email.eq(email));
    if let Some(id) = except {
        query = query.filter(UserCol::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

pub async fn list_users(db: &DatabaseConnection) -> AppResult<ApiResponse<Vec<UserProfile>>> {
    let users = Users::find()
        .order_by_asc(UserCol::Id)
        .all(db)
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect();
    Ok(ApiResponse::success("OK", users, None))
}

pub async fn get_user(db: &DatabaseConnection, id: i32) -> AppResult<ApiResponse<UserProfile>> {
    let user = Users::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ApiResponse::success("OK", user.into(), None))
}

pub async fn create_user<C: ConnectionTrait>(
    db: &C,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<UserProfile>> {
    payload.validate()?;

    let email = payload.email.trim().to_string();
    if email_in_use(db, &email, None).await? {
        return Err(AppError::Conflict("Email is already taken".into()));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = UserActive {
        id: NotSet,
        email: Set(email),
        google_id: Set(None),
        username: Set(Some(payload.username)),
        email_verified: Set(false),
        first_name: Set(None),
        last_name: Set(None),
        phone_number: Set(payload.phone_number),
        profile_picture_path: Set(payload.profile_picture_path),
        password_hash: Set(Some(password_hash)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(db)
    .await
    .map_err(email_taken)?;

    tracing::info!(user_id = user.id, "user registered");

    Ok(ApiResponse::success("User created", user.into(), None))
}

pub async fn update_user<C: ConnectionTrait>(
    db: &C,
    auth: &AuthUser,
    id: i32,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<UserProfile>> {
    ensure_self(auth, id)?;
    payload.validate()?;

    let existing = Users::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if let Some(email) = payload.email.as_deref() {
        if email != existing.email && email_in_use(db, email, Some(id)).await? {
            return Err(AppError::Conflict("Email is already taken".into()));
        }
    }

    let mut active: UserActive = existing.into();
    if let Some(username) = payload.username {
        active.username = Set(Some(username));
    }
    if let Some(email) = payload.email {
        active.email = Set(email);
    }
    if let Some(phone) = payload.phone_number {
        active.phone_number = Set(Some(phone));
    }
    if let Some(path) = payload.profile_picture_path {
        active.profile_picture_path = Set(Some(path));
    }
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(Some(first_name));
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(Some(last_name));
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let user = active.update(db).await.map_err(email_taken)?;

    tracing::info!(user_id = id, "user updated");

    Ok(ApiResponse::success("User updated", user.into(), None))
}

/// Hard delete of the account and its favourites. Refused with 409 while
/// the user owns any listing, deleted ones included.
pub async fn delete_user<C: ConnectionTrait>(
    db: &C,
    auth: &AuthUser,
    id: i32,
) -> AppResult<ApiResponse<DeletedUser>> {
    ensure_self(auth, id)?;

    let user = Users::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let listings = Products::find()
        .filter(products::Column::UserId.eq(id))
        .count(db)
        .await?;
    if listings > 0 {
        return Err(AppError::Conflict(HAS_LISTINGS.into()));
    }

    Users::delete_by_id(id)
        .exec(db)
        .await
        .map_err(listings_remain)?;

    tracing::info!(user_id = id, "user deleted");

    Ok(ApiResponse::success(
        "User deleted successfully",
        DeletedUser {
            id: user.id,
            username: user.username,
            email: user.email,
        },
        None,
    ))
}
