use std::path::{Path, PathBuf};

use axum::{
    Router,
    body::Bytes,
    http::{HeaderValue, Response, header},
};
use tower::ServiceBuilder;
use tower_http::{
    services::{ServeDir, fs::ServeFileSystemResponseBody},
    set_header::SetResponseHeaderLayer,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MAX_FILES: usize = 10;
pub const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;
pub const PUBLIC_PREFIX: &str = "/uploads";

const ALLOWED_MIME: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];
const ALLOWED_EXT: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Stored names never change content, so hits are cacheable forever.
/// Misses must stay uncached.
fn cache_found<B>(response: &Response<B>) -> Option<HeaderValue> {
    response
        .status()
        .is_success()
        .then(|| HeaderValue::from_static("public, max-age=31536000, immutable"))
}

/// An image file part read from a multipart form.
#[derive(Debug, Clone)]
pub struct IncomingImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl IncomingImage {
    pub fn validate(&self) -> AppResult<()> {
        let mime = self.content_type.as_deref().unwrap_or_default();
        if !ALLOWED_MIME.contains(&mime) {
            return Err(AppError::BadRequest(
                "Invalid file type. Only images are allowed.".into(),
            ));
        }
        if self.bytes.len() > MAX_FILE_BYTES {
            return Err(AppError::BadRequest("File too large. Max 5 MB per image.".into()));
        }
        Ok(())
    }
}

/// Random stored name, keeping the original extension only when it is an
/// allowed image extension.
pub fn stored_name(original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| ALLOWED_EXT.contains(&ext.as_str()));

    let id = Uuid::new_v4();
    match ext {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

pub fn public_path(stored: &str) -> String {
    format!("{PUBLIC_PREFIX}/{stored}")
}

/// Image files on local disk, served back under `/uploads`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Writes every image and returns their public paths in upload order.
    /// Files already written are removed when a later one fails.
    pub async fn save(&self, images: &[IncomingImage]) -> AppResult<Vec<String>> {
        if images.len() > MAX_FILES {
            return Err(AppError::BadRequest(format!(
                "Too many files. Max {MAX_FILES} images."
            )));
        }
        for image in images {
            image.validate()?;
        }

        let mut saved = Vec::with_capacity(images.len());
        for image in images {
            let name = stored_name(image.file_name.as_deref());
            if let Err(err) = tokio::fs::write(self.dir.join(&name), &image.bytes).await {
                self.discard(&saved).await;
                return Err(AppError::Internal(err.into()));
            }
            saved.push(public_path(&name));
        }

        tracing::debug!(count = saved.len(), "images stored");
        Ok(saved)
    }

    /// Best-effort removal of previously saved files, by public path.
    pub async fn discard(&self, public_paths: &[String]) {
        for path in public_paths {
            let Some(name) = path.rsplit('/').next() else {
                continue;
            };
            if let Err(err) = tokio::fs::remove_file(self.dir.join(name)).await {
                tracing::warn!(error = %err, file = name, "failed to remove upload");
            }
        }
    }

    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let service = ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                cache_found::<ServeFileSystemResponseBody>,
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("inline"),
            ))
            .service(ServeDir::new(&self.dir));

        Router::new().nest_service(PUBLIC_PREFIX, service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(content_type: &str, len: usize) -> IncomingImage {
        IncomingImage {
            file_name: Some("photo.JPG".into()),
            content_type: Some(content_type.into()),
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn stored_name_keeps_allowed_extension_lowercased() {
        let name = stored_name(Some("Holiday.PNG"));
        assert!(name.ends_with(".png"), "{name}");
        assert_eq!(name.len(), 36 + 4);
    }

    #[test]
    fn stored_name_drops_unknown_extension() {
        let name = stored_name(Some("script.php"));
        assert!(!name.contains('.'), "{name}");
        assert!(Uuid::parse_str(&name).is_ok());
        assert!(Uuid::parse_str(&stored_name(None)).is_ok());
    }

    #[test]
    fn public_path_is_under_uploads() {
        assert_eq!(public_path("a.webp"), "/uploads/a.webp");
    }

    #[test]
    fn only_image_mime_types_are_accepted() {
        assert!(image("image/webp", 10).validate().is_ok());
        assert!(image("text/html", 10).validate().is_err());
    }

    #[test]
    fn oversized_images_are_rejected() {
        assert!(image("image/png", MAX_FILE_BYTES).validate().is_ok());
        assert!(image("image/png", MAX_FILE_BYTES + 1).validate().is_err());
    }

    #[tokio::test]
    async fn too_many_files_are_rejected_before_writing() {
        let store = UploadStore::new(std::env::temp_dir().join("uploads-never-created"));
        let images = vec![image("image/png", 1); MAX_FILES + 1];
        let err = store.save(&images).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn saved_files_land_in_the_upload_dir() {
        let dir = std::env::temp_dir().join(format!("uploads-{}", Uuid::new_v4()));
        let store = UploadStore::new(&dir);
        store.ensure_dir().await.unwrap();

        let paths = store.save(&[image("image/jpeg", 3)]).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with("/uploads/") && paths[0].ends_with(".jpg"));

        let name = paths[0].rsplit('/').next().unwrap();
        assert_eq!(tokio::fs::read(dir.join(name)).await.unwrap().len(), 3);

        store.discard(&paths).await;
        assert!(!dir.join(name).exists());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn only_served_files_are_marked_immutable() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let dir = std::env::temp_dir().join(format!("uploads-serve-{}", Uuid::new_v4()));
        let store = UploadStore::new(&dir);
        store.ensure_dir().await.unwrap();
        tokio::fs::write(dir.join("a.webp"), b"RIFF").await.unwrap();

        let hit = store
            .router::<()>()
            .oneshot(Request::get("/uploads/a.webp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(hit.status(), StatusCode::OK);
        assert_eq!(
            hit.headers()[header::CACHE_CONTROL],
            "public, max-age=31536000, immutable"
        );
        assert_eq!(hit.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let miss = store
            .router::<()>()
            .oneshot(Request::get("/uploads/missing.webp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(miss.status(), StatusCode::NOT_FOUND);
        assert!(miss.headers().get(header::CACHE_CONTROL).is_none());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
