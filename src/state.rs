use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::{password::PasswordService, TokenService};
use crate::config::AppConfig;
use crate::middleware::RateLimiter;
use crate::services::blob_store::{BlobStore, CloudinaryStore, MemoryBlobStore};

/// Shared, read-mostly state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub passwords: Arc<PasswordService>,
    pub blobs: Arc<dyn BlobStore>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: AppConfig, pool: PgPool, blobs: Arc<dyn BlobStore>) -> Self {
        let limiter = RateLimiter::new(
            config.api.rate_limit_requests,
            Duration::from_secs(config.api.rate_limit_window_secs),
        );
        Self {
            pool,
            tokens: Arc::new(TokenService::new(&config.security)),
            passwords: Arc::new(PasswordService::new(&config.security)),
            blobs,
            limiter: Arc::new(limiter),
            config: Arc::new(config),
        }
    }

    /// Cloudinary when credentials are configured, otherwise an in-memory
    /// store.
    pub fn blob_store_for(config: &AppConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
        if config.blob.is_configured() {
            Ok(Arc::new(CloudinaryStore::new(&config.blob)?))
        } else {
            tracing::warn!("Cloudinary credentials not configured, images are kept in memory");
            Ok(Arc::new(MemoryBlobStore::new()))
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
