use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{models::Product, uploads::IncomingImage};

/// Text fields and files of a product multipart form. Absent fields are
/// `None`; `category_ids` keeps every raw `categoryIds` value it saw.
#[derive(Debug, Default)]
pub struct ProductForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub status_id: Option<String>,
    pub category_ids: Option<Vec<String>>,
    pub location_city: Option<String>,
    pub location_country: Option<String>,
    pub images: Vec<IncomingImage>,
}

/// Documentation shape of the product multipart form.
#[derive(Deserialize, ToSchema)]
pub struct ProductFormSchema {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    #[serde(rename = "statusId")]
    #[schema(example = "1")]
    pub status_id: Option<String>,
    /// Comma separated, e.g. `1,2,3`.
    #[serde(rename = "categoryIds")]
    #[schema(example = "1,2")]
    pub category_ids: Option<String>,
    pub location_city: Option<String>,
    pub location_country: Option<String>,
    #[schema(value_type = Vec<String>, format = Binary)]
    pub images: Vec<Vec<u8>>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedProduct {
    pub id: i32,
    pub title: String,
    pub deleted_at: DateTime<Utc>,
}
