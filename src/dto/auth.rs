use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::UserProfile;

/// Body of the Google callback. `code` carries the Google ID token.
#[derive(Deserialize, Debug, ToSchema)]
pub struct GoogleCallbackRequest {
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionUser {
    pub user: UserProfile,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}
