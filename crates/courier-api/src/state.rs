use std::sync::Arc;
use std::time::Duration;

use courier_db::Database;
use tracing::error;

use crate::cache::ResponseCache;
use crate::error::ApiError;
use crate::throttle::{AccessWindow, RateLimiter};

pub type AppState = Arc<AppStateInner>;

/// Tunables for the API layer, filled from the environment by the server.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub jwt_secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    pub cache_ttl: Duration,
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub restricted_hours: Option<AccessWindow>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me".into(),
            access_ttl: chrono::Duration::minutes(60),
            refresh_ttl: chrono::Duration::hours(24),
            cache_ttl: Duration::from_secs(60),
            rate_limit: 5,
            rate_window: Duration::from_secs(60),
            restricted_hours: None,
        }
    }
}

pub struct AppStateInner {
    pub db: Database,
    pub settings: ApiSettings,
    pub cache: ResponseCache,
    pub rate_limiter: RateLimiter,
}

impl AppStateInner {
    pub fn new(db: Database, settings: ApiSettings) -> AppState {
        Arc::new(Self {
            db,
            cache: ResponseCache::new(settings.cache_ttl),
            rate_limiter: RateLimiter::new(settings.rate_limit, settings.rate_window),
            settings,
        })
    }
}

/// Run a blocking database call off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::from)
}
