use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{GoogleCallbackRequest, SessionUser},
        categories::CategoryRequest,
        products::{CountResponse, DeletedProduct, ProductFormSchema, ProductList},
        users::{CreateUserRequest, DeletedUser, UpdateUserRequest},
    },
    middleware::auth::SESSION_COOKIE,
    models::{
        Category, CategoryWithCount, Favourite, Image, Location, OwnerSummary, Product,
        StatusView, UserProfile,
    },
    response::{ApiResponse, Meta},
    routes::{auth, categories, health, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::google_callback,
        auth::me,
        auth::logout,
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::list_favorites,
        users::add_favorite,
        users::remove_favorite,
        products::list_products,
        products::search_products,
        products::list_user_products,
        products::list_sold_products,
        products::list_category_products,
        products::count_category_products,
        products::count_user_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category
    ),
    components(
        schemas(
            Product,
            StatusView,
            Location,
            Image,
            OwnerSummary,
            UserProfile,
            Category,
            CategoryWithCount,
            Favourite,
            ProductList,
            ProductFormSchema,
            CountResponse,
            DeletedProduct,
            CreateUserRequest,
            UpdateUserRequest,
            DeletedUser,
            CategoryRequest,
            GoogleCallbackRequest,
            SessionUser,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Google login and session endpoints"),
        (name = "Users", description = "User endpoints"),
        (name = "Favorites", description = "Favourite endpoints"),
        (name = "Products", description = "Listing endpoints"),
        (name = "Categories", description = "Category endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_group_is_documented() {
        let spec = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/auth/google/callback",
            "/api/users/{id}/favorites/{product_id}",
            "/api/products/search-filter",
            "/api/products/{id}/sold",
            "/api/categories/{id}",
        ] {
            assert!(spec.paths.paths.contains_key(path), "{path} missing");
        }
    }

    #[test]
    fn both_session_transports_are_declared() {
        let spec = ApiDoc::openapi();
        let schemes = &spec.components.expect("components").security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
        assert!(schemes.contains_key("session_cookie"));
    }
}
