/// Key-value cache layer for the authentication gate
///
/// Provides the raw get / set-with-TTL / delete store the session cache tiers
/// sit on, with two backends:
/// - Redis, shared between processes
/// - an in-process map, for single-node deployments and tests

pub mod session;

pub use session::{CacheLookup, CombinedEntry, SessionCache, Validity, WriteTicket};

use crate::clock::SharedClock;
use crate::error::{GateError, GateResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the Redis tiers (default: false, store-only resolution)
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub redis_url: String,

    /// Key prefix for all cache entries (default: "authgate:")
    pub key_prefix: String,

    /// Session-validity tier TTL in seconds (default: 60)
    pub validity_ttl: u64,

    /// Account-snapshot tier TTL in seconds (default: 300)
    pub snapshot_ttl: u64,

    /// Combined tier TTL in seconds (default: 60)
    pub combined_ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "authgate:".to_string(),
            validity_ttl: 60,
            snapshot_ttl: 300,
            combined_ttl: 60,
        }
    }
}

impl CacheConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            enabled: std::env::var("AUTHGATE_CACHE_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("AUTHGATE_CACHE_KEY_PREFIX")
                .unwrap_or(defaults.key_prefix),
            validity_ttl: parse("AUTHGATE_CACHE_VALIDITY_TTL", defaults.validity_ttl),
            snapshot_ttl: parse("AUTHGATE_CACHE_SNAPSHOT_TTL", defaults.snapshot_ttl),
            combined_ttl: parse("AUTHGATE_CACHE_COMBINED_TTL", defaults.combined_ttl),
        }
    }
}

/// Raw key-value cache store
///
/// A missing key is `Ok(None)`; `Err` means the store itself misbehaved.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> GateResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> GateResult<()>;

    async fn delete(&self, keys: &[String]) -> GateResult<()>;
}

/// Redis cache client
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisCacheStore {
    /// Connect to Redis
    pub async fn connect(config: &CacheConfig) -> GateResult<Self> {
        if !config.enabled {
            return Err(GateError::Internal(
                "Cache is disabled, cannot create client".to_string(),
            ));
        }

        info!("Connecting to Redis at {}", config.redis_url);

        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            GateError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            GateError::Cache(format!("Redis connection failed: {}", e))
        })?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Build a cache key with prefix
    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Ping Redis to check connection
    pub async fn ping(&self) -> GateResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| GateError::Cache(format!("Cache ping failed: {}", e)))?;

        if pong != "PONG" {
            return Err(GateError::Cache("Unexpected Redis PING response".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> GateResult<Option<String>> {
        let cache_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.get(&cache_key).await.map_err(|e| {
            debug!("Redis GET failed for {}: {}", cache_key, e);
            GateError::Cache(format!("Cache get failed: {}", e))
        })
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> GateResult<()> {
        let cache_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.set_ex::<_, _, ()>(&cache_key, value, ttl_secs)
            .await
            .map_err(|e| {
                debug!("Redis SET failed for {}: {}", cache_key, e);
                GateError::Cache(format!("Cache set failed: {}", e))
            })
    }

    async fn delete(&self, keys: &[String]) -> GateResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let cache_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(&cache_keys).await.map_err(|e| {
            warn!("Redis DELETE failed for {:?}: {}", cache_keys, e);
            GateError::Cache(format!("Cache delete failed: {}", e))
        })
    }
}

/// In-process cache store honouring TTLs against an injected clock
#[derive(Clone)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, (String, DateTime<Utc>)>>>,
    clock: SharedClock,
    writes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryCacheStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            writes: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, (String, DateTime<Utc>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> GateResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GateError::Cache("cache store unavailable".to_string()));
        }
        Ok(())
    }

    /// Number of successful writes since creation
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Keys that have not expired yet, sorted
    pub fn live_keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .entries()
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Make every operation fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> GateResult<Option<String>> {
        self.check_available()?;

        let now = self.clock.now();
        let mut entries = self.entries();
        let expired = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> GateResult<()> {
        self.check_available()?;

        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000);
        let expires_at = self.clock.now() + Duration::seconds(ttl);
        self.entries()
            .insert(key.to_string(), (value.to_string(), expires_at));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> GateResult<()> {
        self.check_available()?;

        let mut entries = self.entries();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Cache key categories
pub mod categories {
    pub const SESSION_VALIDITY: &str = "session:valid:";
    pub const SESSION_COMBINED: &str = "session:combined:";
    pub const ACCOUNT_SNAPSHOT: &str = "account:snapshot:";
}
