use std::env;

const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:5500,http://localhost:5000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub google_client_id: String,
    pub upload_dir: String,
    pub cors_origins: Vec<String>,
    /// Marks the session cookie `Secure`.
    pub production: bool,
    pub max_body_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let google_client_id = env::var("GOOGLE_CLIENT_ID").unwrap_or_default();
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(5000);
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let cors_origins = parse_origins(
            &env::var("CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string()),
        );
        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let max_body_bytes = env::var("MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(52 * 1024 * 1024);

        if google_client_id.is_empty() {
            tracing::warn!("GOOGLE_CLIENT_ID is not set, Google login will reject every token");
        }

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            google_client_id,
            upload_dir,
            cors_origins,
            production,
            max_body_bytes,
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
