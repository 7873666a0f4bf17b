use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, services::google::GoogleVerifier, uploads::UploadStore};

#[derive(Clone)]
pub struct AppState {
    pub orm: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub google: Arc<dyn GoogleVerifier>,
    pub uploads: UploadStore,
}
