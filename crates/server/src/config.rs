// Server configuration.
//
// Centralizes environment variable parsing with defaults for local use.
// Pool tuning lives in `db::pool::PoolConfig`; this module covers the core
// server settings.

use std::{net::SocketAddr, path::PathBuf};

const DEV_JWT_SECRET: &str = "zsk_local_development_jwt_secret_must_be_32_chars";
const DEFAULT_DATABASE_URL: &str = "sqlite://data/zsk.db";
const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`], which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// HS256 signing secret for bearer tokens.
    pub jwt_secret: String,
    /// SQLite connection string.
    pub database_url: String,
    /// Directory uploaded images are written to and served from.
    pub uploads_dir: PathBuf,
    /// Origin prepended to upload URLs handed back to clients.
    pub public_origin: String,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Largest accepted request body; image uploads arrive as data URLs.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `ZSK_HOST` | `0.0.0.0` |
    /// | `ZSK_PORT`, then `PORT` | `3000` |
    /// | `ZSK_JWT_SECRET`, then `JWT_SECRET` | dev-only placeholder |
    /// | `ZSK_DATABASE_URL`, then `DATABASE_URL` | `sqlite://data/zsk.db` |
    /// | `ZSK_UPLOADS_DIR` | `uploads` |
    /// | `ZSK_PUBLIC_ORIGIN` | `http://{host}:{port}` |
    /// | `ZSK_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `ZSK_LOG_FILTER` | `info` |
    /// | `ZSK_MAX_BODY_BYTES` | 32 MiB |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|key| env(key).ok());

        let host = env("ZSK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            first(&["ZSK_PORT", "PORT"]).and_then(|v| v.parse().ok()).unwrap_or(3000);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret =
            first(&["ZSK_JWT_SECRET", "JWT_SECRET"]).unwrap_or_else(|| DEV_JWT_SECRET.into());
        let database_url = first(&["ZSK_DATABASE_URL", "DATABASE_URL"])
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
        let uploads_dir =
            env("ZSK_UPLOADS_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("uploads"));
        let public_origin = env("ZSK_PUBLIC_ORIGIN")
            .map(|origin| origin.trim_end_matches('/').to_owned())
            .unwrap_or_else(|_| format!("http://{listen_addr}"));
        let cors_origins = env("ZSK_CORS_ORIGINS").ok();
        let log_filter = env("ZSK_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let max_body_bytes = env("ZSK_MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Self {
            listen_addr,
            jwt_secret,
            database_url,
            uploads_dir,
            public_origin,
            cors_origins,
            log_filter,
            max_body_bytes,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = ServerConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.port(), 3000);
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
        assert!(cfg.is_dev_jwt_secret());
        assert_eq!(cfg.database_url, "sqlite://data/zsk.db");
        assert_eq!(cfg.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.public_origin, "http://0.0.0.0:3000");
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.max_body_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn prefixed_variables_win_over_legacy_names() {
        let mut m = HashMap::new();
        m.insert("ZSK_PORT", "4000");
        m.insert("PORT", "5000");
        m.insert("DATABASE_URL", "sqlite://legacy.db");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 4000);
        assert_eq!(cfg.database_url, "sqlite://legacy.db");
    }

    #[test]
    fn legacy_port_and_secret_are_honoured() {
        let mut m = HashMap::new();
        m.insert("PORT", "8081");
        m.insert("JWT_SECRET", "production_secret_at_least_32_chars!!");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 8081);
        assert!(!cfg.is_dev_jwt_secret());
    }

    #[test]
    fn custom_host_and_origin() {
        let mut m = HashMap::new();
        m.insert("ZSK_HOST", "127.0.0.1");
        m.insert("ZSK_PUBLIC_ORIGIN", "https://notes.example.com/");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(cfg.public_origin, "https://notes.example.com");
    }

    #[test]
    fn invalid_numbers_use_defaults() {
        let mut m = HashMap::new();
        m.insert("ZSK_PORT", "not_a_number");
        m.insert("ZSK_MAX_BODY_BYTES", "lots");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 3000);
        assert_eq!(cfg.max_body_bytes, 32 * 1024 * 1024);
    }
}
