use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::{categories, favourites, images, locations, users};

/// Listing lifecycle state. Stored as `status_id` (1 = active, 2 = sold).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Sold,
}

impl ProductStatus {
    pub fn id(self) -> i32 {
        match self {
            ProductStatus::Active => 1,
            ProductStatus::Sold => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Sold => "sold",
        }
    }
}

impl TryFrom<i32> for ProductStatus {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProductStatus::Active),
            2 => Ok(ProductStatus::Sold),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct StatusView {
    pub id: i32,
    pub name: String,
}

impl From<ProductStatus> for StatusView {
    fn from(status: ProductStatus) -> Self {
        Self {
            id: status.id(),
            name: status.name().to_string(),
        }
    }
}

/// Public user profile. Never carries the password hash or Google subject.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: i32,
    pub email: String,
    pub username: Option<String>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub profile_picture_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for UserProfile {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            username: model.username,
            email_verified: model.email_verified,
            first_name: model.first_name,
            last_name: model.last_name,
            phone_number: model.phone_number,
            profile_picture_path: model.profile_picture_path,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct OwnerSummary {
    pub id: i32,
    pub username: Option<String>,
    pub email: String,
    pub phone_number: Option<String>,
}

impl From<users::Model> for OwnerSummary {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            phone_number: model.phone_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct Category {
    pub id: i32,
    pub name: String,
}

impl From<categories::Model> for Category {
    fn from(model: categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct CategoryWithCount {
    pub id: i32,
    pub name: String,
    #[serde(rename = "productCount")]
    pub product_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct Location {
    pub id: i32,
    pub city: String,
    pub country: Option<String>,
}

impl From<locations::Model> for Location {
    fn from(model: locations::Model) -> Self {
        Self {
            id: model.id,
            city: model.city,
            country: model.country,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct Image {
    pub id: i32,
    pub url: String,
    pub is_primary: bool,
}

impl From<images::Model> for Image {
    fn from(model: images::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            is_primary: model.is_primary,
        }
    }
}

/// A listing with its relations attached, as served to clients.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct Product {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub status: StatusView,
    pub location: Location,
    pub user: OwnerSummary,
    pub categories: Vec<Category>,
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "isFavorite")]
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Favourite {
    pub id: i32,
    pub user_id: i32,
    pub product_id: i32,
    pub created_at: DateTime<Utc>,
}

impl From<favourites::Model> for Favourite {
    fn from(model: favourites::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            product_id: model.product_id,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ids_round_trip_through_the_enum() {
        assert_eq!(ProductStatus::try_from(1), Ok(ProductStatus::Active));
        assert_eq!(ProductStatus::try_from(2), Ok(ProductStatus::Sold));
        assert_eq!(ProductStatus::Sold.id(), 2);
    }

    #[test]
    fn unknown_status_ids_are_rejected() {
        assert_eq!(ProductStatus::try_from(0), Err(0));
        assert_eq!(ProductStatus::try_from(3), Err(3));
    }

    #[test]
    fn status_view_uses_lookup_names() {
        let view = StatusView::from(ProductStatus::Active);
        assert_eq!(view, StatusView { id: 1, name: "active".into() });
    }
}
