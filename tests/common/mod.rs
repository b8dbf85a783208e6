//! Shared fixtures for integration tests
#![allow(dead_code)]

use aurora_authgate::{
    cache::{CacheConfig, CacheStore, MemoryCacheStore},
    clock::{Clock, ManualClock},
    config::{
        ActivityConfig, GateConfig, LockoutConfig, LoggingConfig, ServiceConfig, StorageConfig,
        TokenConfig,
    },
    db::account::{AccountSnapshot, AccountStatus, SecurityState, Session},
    store::{MemorySessionStore, SessionStore},
    token::WireClaims,
    Authenticator,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;

pub const SECRET: &str = "integration-secret-that-is-long-enough";
pub const ISSUER: &str = "https://auth.example.com";
pub const AUDIENCE: &str = "example-api";

pub fn config() -> GateConfig {
    GateConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".into(),
            port: 0,
            debug_reasons: false,
        },
        storage: StorageConfig {
            database_path: "./data/unused.sqlite".into(),
        },
        token: TokenConfig {
            secret: SECRET.into(),
            algorithm: "HS256".into(),
            issuer: ISSUER.into(),
            audience: AUDIENCE.into(),
            leeway_secs: 0,
        },
        cache: CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        },
        activity: ActivityConfig::default(),
        lockout: LockoutConfig::default(),
        logging: LoggingConfig {
            level: "debug".into(),
        },
    }
}

pub fn account(id: &str, public_id: &str) -> AccountSnapshot {
    AccountSnapshot {
        account_id: id.into(),
        public_id: public_id.into(),
        email: format!("{}@example.com", id),
        username: id.into(),
        display_name: Some(format!("User {}", id)),
        role: "user".into(),
        status: AccountStatus::Active,
        email_verified: true,
        deleted_at: None,
        security: SecurityState::default(),
    }
}

/// Authenticator over in-memory store and cache with a manual clock
pub struct Harness {
    pub auth: Authenticator,
    pub store: MemorySessionStore,
    pub cache: MemoryCacheStore,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(true)
    }

    /// No cache tiers: every request goes to the store
    pub fn store_only() -> Self {
        Self::build(false)
    }

    fn build(with_cache: bool) -> Self {
        let clock = ManualClock::starting_now();
        let store = MemorySessionStore::new();
        let cache = MemoryCacheStore::new(Arc::new(clock.clone()));

        let cache_store = with_cache.then(|| Arc::new(cache.clone()) as Arc<dyn CacheStore>);
        let auth = Authenticator::new(
            &config(),
            Arc::new(store.clone()) as Arc<dyn SessionStore>,
            cache_store,
            Arc::new(clock.clone()),
        )
        .expect("authenticator");

        let harness = Self {
            auth,
            store,
            cache,
            clock,
        };
        harness.add_account("a1", "pub-1");
        harness.add_session("s1", "a1");
        harness
    }

    pub fn add_account(&self, id: &str, public_id: &str) {
        self.store.insert_account(account(id, public_id), self.clock.now());
    }

    pub fn add_session(&self, id: &str, account_id: &str) {
        self.store.insert_session(Session {
            id: id.into(),
            owner_id: account_id.into(),
            is_revoked: false,
            expires_at: self.clock.now() + Duration::days(7),
            last_active_at: self.clock.now(),
        });
    }

    /// Token for `subject` bound to `session_id`, issued now
    pub fn token(&self, subject: &str, session_id: Option<&str>) -> String {
        self.token_issued_at(subject, session_id, self.clock.now())
    }

    pub fn token_issued_at(
        &self,
        subject: &str,
        session_id: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> String {
        sign(
            &WireClaims {
                sub: subject.into(),
                email: format!("{}@example.com", subject),
                role: "user".into(),
                sid: session_id.map(str::to_string),
                iat: issued_at.timestamp(),
                // Expiry is checked against wall time, not the manual clock
                exp: (Utc::now() + Duration::hours(1)).timestamp(),
                iss: ISSUER.into(),
                aud: AUDIENCE.into(),
            },
            SECRET,
        )
    }
}

pub fn sign(claims: &WireClaims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign token")
}

/// Let spawned cache and activity writes run
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
