use chrono::{Duration, Utc};
use cookie::{Cookie, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    dto::auth::{Claims, SessionUser},
    entity::{
        Users,
        users::{ActiveModel as UserActive, Column as UserCol, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, SESSION_COOKIE},
    response::ApiResponse,
    services::google::{GoogleProfile, GoogleVerifier},
};

pub const SESSION_DAYS: i64 = 7;

pub fn issue_token(secret: &str, user: &UserModel) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(SESSION_DAYS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// `Set-Cookie` value carrying the session token.
pub fn session_cookie(token: &str, secure: bool) -> String {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::days(SESSION_DAYS))
        .build()
        .to_string()
}

pub fn clear_session_cookie(secure: bool) -> String {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
        .to_string()
}

/// Finds the account for a Google identity by subject or email. Unknown
/// identities get a new account; an email-only match is linked to the
/// Google subject.
pub async fn resolve_google_user<C: ConnectionTrait>(
    db: &C,
    profile: &GoogleProfile,
) -> AppResult<UserModel> {
    let existing = Users::find()
        .filter(
            Condition::any()
                .add(UserCol::GoogleId.eq(profile.sub.as_str()))
                .add(UserCol::Email.eq(profile.email.as_str())),
        )
        .one(db)
        .await?;

    match existing {
        None => {
            let user = UserActive {
                id: NotSet,
                email: Set(profile.email.clone()),
                google_id: Set(Some(profile.sub.clone())),
                username: Set(profile.name.clone()),
                email_verified: Set(profile.email_verified),
                first_name: Set(profile.given_name.clone()),
                last_name: Set(profile.family_name.clone()),
                phone_number: Set(None),
                profile_picture_path: Set(profile.picture.clone()),
                password_hash: Set(None),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(db)
            .await?;
            tracing::info!(user_id = user.id, "user created from google login");
            Ok(user)
        }
        Some(user) if user.google_id.is_none() => {
            let user_id = user.id;
            let mut active: UserActive = user.into();
            active.google_id = Set(Some(profile.sub.clone()));
            active.email_verified = Set(profile.email_verified);
            active.first_name = Set(profile.given_name.clone());
            active.last_name = Set(profile.family_name.clone());
            active.updated_at = Set(Utc::now().fixed_offset());
            let user = active.update(db).await?;
            tracing::info!(user_id, "google account linked to existing user");
            Ok(user)
        }
        Some(user) => Ok(user),
    }
}

/// Verifies the ID token, resolves the account and returns it with a fresh
/// session token.
pub async fn google_login(
    db: &DatabaseConnection,
    verifier: &dyn GoogleVerifier,
    jwt_secret: &str,
    id_token: Option<&str>,
) -> AppResult<(SessionUser, String)> {
    let id_token = id_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("ID token required".into()))?;

    let profile = verifier.verify(id_token).await.map_err(|err| {
        tracing::warn!(error = %err, "google token verification failed");
        AppError::Unauthorized("Authentication failed".into())
    })?;

    let user = resolve_google_user(db, &profile).await?;
    let token = issue_token(jwt_secret, &user)?;

    tracing::info!(user_id = user.id, "user logged in");

    Ok((SessionUser { user: user.into() }, token))
}

pub async fn me(db: &DatabaseConnection, user: &AuthUser) -> AppResult<ApiResponse<SessionUser>> {
    let found = Users::find_by_id(user.user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(ApiResponse::success(
        "OK",
        SessionUser { user: found.into() },
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sea_orm::{DatabaseBackend, MockDatabase};

    const SECRET: &str = "test-secret";

    fn profile() -> GoogleProfile {
        GoogleProfile {
            sub: "google-sub-1".into(),
            email: "new@example.com".into(),
            email_verified: true,
            name: Some("New User".into()),
            given_name: Some("New".into()),
            family_name: Some("User".into()),
            picture: None,
        }
    }

    fn user(id: i32, google_id: Option<&str>) -> UserModel {
        let now = Utc::now().fixed_offset();
        UserModel {
            id,
            email: "new@example.com".into(),
            google_id: google_id.map(Into::into),
            username: Some("New User".into()),
            email_verified: true,
            first_name: Some("New".into()),
            last_name: Some("User".into()),
            phone_number: None,
            profile_picture_path: None,
            password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct FixedVerifier(Option<GoogleProfile>);

    #[async_trait]
    impl GoogleVerifier for FixedVerifier {
        async fn verify(&self, _id_token: &str) -> anyhow::Result<GoogleProfile> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("rejected"))
        }
    }

    #[test]
    fn token_round_trips_user_identity() {
        let token = issue_token(SECRET, &user(42, None)).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "new@example.com");
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token("other", &user(42, None)).unwrap();
        assert!(verify_token(SECRET, &token).is_err());
        assert!(verify_token(SECRET, "invalid.token.here").is_err());
    }

    #[test]
    fn session_cookie_is_http_only_for_seven_days() {
        let cookie = session_cookie("abc", false);
        assert!(cookie.starts_with("session=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));
        assert!(session_cookie("abc", true).contains("Secure"));
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn first_google_login_creates_exactly_one_user() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<UserModel>::new()])
            .append_query_results([vec![user(1, Some("google-sub-1"))]])
            .into_connection();

        let created = resolve_google_user(&db, &profile()).await.unwrap();
        assert_eq!(created.google_id.as_deref(), Some("google-sub-1"));

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        let insert = format!("{:?}", log[1]);
        assert!(insert.contains(r#"INSERT INTO \"users\""#), "{insert}");
        assert!(insert.contains("google-sub-1"), "{insert}");
    }

    #[tokio::test]
    async fn email_match_without_google_id_is_linked() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user(5, None)]])
            .append_query_results([vec![user(5, Some("google-sub-1"))]])
            .into_connection();

        let linked = resolve_google_user(&db, &profile()).await.unwrap();
        assert_eq!(linked.id, 5);
        assert_eq!(linked.google_id.as_deref(), Some("google-sub-1"));
        assert!(format!("{:?}", db.into_transaction_log()[1]).contains("UPDATE"));
    }

    #[tokio::test]
    async fn known_google_user_is_returned_untouched() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user(5, Some("google-sub-1"))]])
            .into_connection();

        let found = resolve_google_user(&db, &profile()).await.unwrap();
        assert_eq!(found.id, 5);
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn missing_id_token_is_bad_request() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let verifier = FixedVerifier(Some(profile()));
        let err = google_login(&db, &verifier, SECRET, Some("  ")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn rejected_id_token_is_unauthorized() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let verifier = FixedVerifier(None);
        let err = google_login(&db, &verifier, SECRET, Some("token")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert_eq!(err.to_string(), "Authentication failed");
    }
}
