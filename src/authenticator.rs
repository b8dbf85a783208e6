/// Request authentication entry points
///
/// [`Authenticator`] is what the rest of a service talks to: it turns a raw
/// bearer credential into a [`Principal`], and exposes the cache
/// invalidation and lockout operations used by login, logout and account
/// security flows.
use crate::{
    activity::ActivityTracker,
    cache::{CacheStore, SessionCache},
    clock::SharedClock,
    config::GateConfig,
    db::account::AccountSnapshot,
    error::{GateError, GateResult},
    gate::AccessGate,
    lockout::{AccountLockGuard, LockStatus, LockoutResult},
    metrics,
    resolver::{CachedResolver, ResolveSession, StoreResolver},
    store::SessionStore,
    token::{TokenClaims, TokenVerifier},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// The authenticated caller of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub account_id: String,
    pub public_id: String,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
    pub session_id: String,
    pub email_verified: bool,
}

impl Principal {
    fn new(snapshot: AccountSnapshot, session_id: String) -> Self {
        Self {
            account_id: snapshot.account_id,
            public_id: snapshot.public_id,
            email: snapshot.email,
            username: snapshot.username,
            display_name: snapshot.display_name,
            role: snapshot.role,
            session_id,
            email_verified: snapshot.email_verified,
        }
    }
}

/// Authentication core
pub struct Authenticator {
    verifier: TokenVerifier,
    resolver: Arc<dyn ResolveSession>,
    cache: Option<SessionCache>,
    gate: AccessGate,
    activity: ActivityTracker,
    lock_guard: AccountLockGuard,
    clock: SharedClock,
}

impl Authenticator {
    /// Wire the components together
    ///
    /// Without a cache store every request resolves against `store`.
    pub fn new(
        config: &GateConfig,
        store: Arc<dyn SessionStore>,
        cache_store: Option<Arc<dyn CacheStore>>,
        clock: SharedClock,
    ) -> GateResult<Self> {
        let verifier = TokenVerifier::new(&config.token)?;
        let store_resolver = StoreResolver::new(Arc::clone(&store), Arc::clone(&clock));

        let cache = cache_store.map(|cache_store| SessionCache::new(cache_store, &config.cache));
        let resolver: Arc<dyn ResolveSession> = match &cache {
            Some(cache) => {
                info!("Session resolution fronted by cache tiers");
                Arc::new(CachedResolver::new(store_resolver, cache.clone()))
            }
            None => {
                info!("Session resolution is store-only");
                Arc::new(store_resolver)
            }
        };

        Ok(Self {
            verifier,
            resolver,
            cache,
            gate: AccessGate::new(),
            activity: ActivityTracker::new(Arc::clone(&store), Arc::clone(&clock), &config.activity),
            lock_guard: AccountLockGuard::new(store, Arc::clone(&clock), &config.lockout),
            clock,
        })
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Verify the credential and resolve its session, without account checks
    pub async fn resolve_session(&self, raw: &str) -> GateResult<(TokenClaims, AccountSnapshot)> {
        let claims = self.verifier.verify(raw)?;
        let snapshot = self.resolver.resolve(&claims).await?;
        Ok((claims, snapshot))
    }

    async fn authenticate_inner(&self, raw: &str) -> GateResult<Principal> {
        let (claims, snapshot) = self.resolve_session(raw).await?;
        self.gate.check(&snapshot, self.clock.now())?;

        let session_id = claims.session_id.ok_or_else(|| {
            GateError::Internal("resolved session without a session binding".to_string())
        })?;
        self.activity.touch(&session_id);

        Ok(Principal::new(snapshot, session_id))
    }

    /// Authenticate a raw bearer credential
    pub async fn authenticate(&self, raw: &str) -> GateResult<Principal> {
        let result = self.authenticate_inner(raw).await;
        match &result {
            Ok(principal) => {
                metrics::record_auth_outcome("success");
                debug!(
                    "Authenticated {} on session {}",
                    principal.public_id, principal.session_id
                );
            }
            Err(e) => {
                metrics::record_auth_outcome(e.outcome_label());
                debug!("Authentication rejected: {}", e);
            }
        }
        result
    }

    /// Authenticate if a credential is present, never failing
    pub async fn authenticate_optional(&self, raw: Option<&str>) -> Option<Principal> {
        let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
        self.authenticate(raw).await.ok()
    }

    /// Forget a session in every cache tier and pin it as invalid
    pub async fn invalidate_session(&self, session_id: &str) -> GateResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let session_ids = [session_id.to_string()];
        cache.invalidate(&session_ids, None).await?;
        cache.mark_invalid(&session_ids).await?;
        debug!("Invalidated session {}", session_id);
        Ok(())
    }

    /// Drop the cached snapshot of an account
    pub async fn invalidate_account(&self, public_id: &str) -> GateResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        cache.invalidate(&[], Some(public_id)).await?;
        debug!("Invalidated account snapshot {}", public_id);
        Ok(())
    }

    /// Invalidate an account snapshot and the listed sessions together
    pub async fn invalidate_all(&self, public_id: &str, session_ids: &[String]) -> GateResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        cache.invalidate(session_ids, Some(public_id)).await?;
        cache.mark_invalid(session_ids).await?;
        info!(
            "Invalidated {} sessions for account {}",
            session_ids.len(),
            public_id
        );
        Ok(())
    }

    pub async fn record_login_failure(&self, account_id: &str) -> GateResult<LockoutResult> {
        self.lock_guard.record_failure(account_id).await
    }

    pub async fn clear_login_failures(&self, account_id: &str) -> GateResult<()> {
        self.lock_guard.unlock(account_id).await
    }

    pub async fn is_account_locked(&self, account_id: &str) -> GateResult<LockStatus> {
        self.lock_guard.is_locked(account_id).await
    }

    /// One pass of failure-count decay; returns accounts decremented
    pub async fn run_decay_sweep(&self) -> GateResult<u64> {
        self.lock_guard.decay_sweep().await
    }
}
