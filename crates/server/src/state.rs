use std::{path::PathBuf, sync::Arc};

use sqlx::SqlitePool;

use crate::{
    auth::jwt::JwtService,
    backup::database_file,
    config::ServerConfig,
    db::allocator::{IdAllocator, IdSpace},
};

/// Where uploaded images go and how clients reach them.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub public_origin: String,
}

/// Shared handler state. Cheap to clone; everything heavy sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtService>,
    pub document_ids: Arc<IdAllocator>,
    pub bookmark_ids: Arc<IdAllocator>,
    pub uploads: Arc<UploadSettings>,
    /// Store file that restores are staged beside; `None` for in-memory stores.
    pub database_path: Option<Arc<PathBuf>>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtService, uploads: UploadSettings) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            document_ids: Arc::new(IdAllocator::new(IdSpace::Documents)),
            bookmark_ids: Arc::new(IdAllocator::new(IdSpace::Bookmarks)),
            uploads: Arc::new(uploads),
            database_path: None,
        }
    }

    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.database_path = Some(Arc::new(path));
        self
    }

    pub fn from_config(pool: SqlitePool, config: &ServerConfig) -> anyhow::Result<Self> {
        let jwt = JwtService::new(&config.jwt_secret)?;
        let uploads = UploadSettings {
            dir: config.uploads_dir.clone(),
            public_origin: config.public_origin.clone(),
        };
        let state = Self::new(pool, jwt, uploads);
        Ok(match database_file(&config.database_url)? {
            Some(path) => state.with_database_path(path),
            None => state,
        })
    }
}
