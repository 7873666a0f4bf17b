pub mod auth_service;
pub mod category_service;
pub mod favorite_service;
pub mod google;
pub mod listing;
pub mod location_service;
pub mod product_service;
pub mod user_service;
