/// Application context and dependency injection
use crate::{
    authenticator::Authenticator,
    cache::{CacheStore, RedisCacheStore},
    clock::system_clock,
    config::GateConfig,
    db,
    error::GateResult,
    store::{SessionStore, SqliteSessionStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared services handed to handlers and background jobs
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<GateConfig>,
    pub db: SqlitePool,
    pub authenticator: Arc<Authenticator>,
    pub redis: Option<RedisCacheStore>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: GateConfig) -> GateResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.storage.database_path, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool.clone()));

        // A cache that cannot be reached at startup is skipped, not fatal
        let redis = if config.cache.enabled {
            match RedisCacheStore::connect(&config.cache).await {
                Ok(redis) => Some(redis),
                Err(e) => {
                    warn!("Cache unavailable, resolving sessions from the store only: {}", e);
                    None
                }
            }
        } else {
            info!("Session cache disabled");
            None
        };
        let cache_store = redis
            .clone()
            .map(|redis| Arc::new(redis) as Arc<dyn CacheStore>);

        let authenticator = Authenticator::new(&config, store, cache_store, system_clock())?;

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            authenticator: Arc::new(authenticator),
            redis,
        })
    }

    /// Get service address
    pub fn service_addr(&self) -> String {
        format!(
            "{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
