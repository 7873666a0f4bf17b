use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;
pub const MAX_TERM_CHARS: usize = 100;
/// Largest OFFSET Postgres accepts as a BIGINT.
const MAX_OFFSET: u64 = i64::MAX as u64;

/// Raw `page` / `limit` query values. Kept as strings so malformed numbers
/// fall back to defaults instead of failing extraction.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl Pagination {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: Some(page.to_string()),
            limit: Some(limit.to_string()),
        }
    }

    /// Returns `(page, limit, offset)`. Pages past the last addressable
    /// offset are clamped to it.
    pub fn normalize(&self) -> (u64, u64, u64) {
        let limit = parse_positive(self.limit.as_deref())
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        let page = parse_positive(self.page.as_deref())
            .unwrap_or(1)
            .min(MAX_OFFSET / limit + 1);
        let offset = (page - 1) * limit;
        (page, limit, offset)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    let value = raw?.trim().parse::<i64>().ok()?;
    Some(value.max(1) as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Title,
}

impl ProductSortBy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "created_at" => Some(ProductSortBy::CreatedAt),
            "price" => Some(ProductSortBy::Price),
            "title" => Some(ProductSortBy::Title),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: ProductSortBy,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: ProductSortBy::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

impl SortSpec {
    /// `sort=field:direction` wins over the split `sortBy` / `sortDir` form.
    /// Each part outside its allow-list keeps the default instead of failing.
    pub fn parse(sort: Option<&str>, sort_by: Option<&str>, sort_dir: Option<&str>) -> Self {
        let mut spec = SortSpec::default();
        let (field, dir) = match sort {
            Some(sort) => {
                let mut parts = sort.splitn(2, ':');
                (parts.next(), parts.next())
            }
            None => (sort_by, sort_dir),
        };
        if let Some(field) = field.and_then(ProductSortBy::parse) {
            spec.field = field;
        }
        if let Some(order) = dir.and_then(SortOrder::parse) {
            spec.order = order;
        }
        spec
    }
}

/// Query string of `GET /api/products/search-filter`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub q: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub location: Option<String>,
    pub sort: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub category_id: Option<String>,
}

/// Validated listing filter. Built only through [`SearchQuery::into_filter`]
/// or [`ListingFilter::default`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub city: Option<String>,
    pub category_id: Option<i32>,
    pub sort: SortSpec,
}

impl SearchQuery {
    pub fn into_filter(self) -> AppResult<(Pagination, ListingFilter)> {
        let (min_price, max_price) =
            parse_price_bounds(self.min_price.as_deref(), self.max_price.as_deref())?;

        let category_id = match self.category_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| AppError::BadRequest("Invalid categoryId".into()))?,
            ),
        };

        let filter = ListingFilter {
            search: clean_term(self.q.as_deref()),
            min_price,
            max_price,
            city: clean_term(self.location.as_deref()),
            category_id,
            sort: SortSpec::parse(
                self.sort.as_deref(),
                self.sort_by.as_deref(),
                self.sort_dir.as_deref(),
            ),
        };
        Ok((self.pagination, filter))
    }
}

/// Trims and caps a free-text term; blank input means "no filter".
pub fn clean_term(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TERM_CHARS).collect())
}

pub fn parse_price_bounds(
    min: Option<&str>,
    max: Option<&str>,
) -> AppResult<(Option<f64>, Option<f64>)> {
    let min = parse_price(min)?;
    let max = parse_price(max)?;

    if min.is_some_and(|v| v < 0.0) || max.is_some_and(|v| v < 0.0) {
        return Err(AppError::BadRequest("Prices must be non-negative".into()));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(AppError::Unprocessable(
                "Max price must be higher than min price".into(),
            ));
        }
    }
    Ok((min, max))
}

fn parse_price(raw: Option<&str>) -> AppResult<Option<f64>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(AppError::BadRequest("Invalid price values".into())),
    }
}

/// Parses a comma separated id list, dropping non-integers and keeping the
/// first occurrence of each id.
pub fn parse_category_ids<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<i32> {
    let mut ids = Vec::new();
    for chunk in raw {
        for token in chunk.split(',') {
            if let Ok(id) = token.trim().parse::<i32>() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}
