/// Session resolution
///
/// [`StoreResolver`] answers from the persistent store alone and is the
/// reference behaviour. [`CachedResolver`] wraps any resolver with the
/// session cache tiers without changing what it decides, only how often the
/// store is asked.
use crate::{
    cache::{CacheLookup, CombinedEntry, SessionCache, Validity, WriteTicket},
    clock::SharedClock,
    db::account::AccountSnapshot,
    error::{GateError, GateResult, UnauthorizedReason},
    metrics,
    store::SessionStore,
    token::TokenClaims,
};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, error};

/// Resolves verified claims to the account they act for
#[async_trait]
pub trait ResolveSession: Send + Sync {
    async fn resolve(&self, claims: &TokenClaims) -> GateResult<AccountSnapshot>;
}

fn reject(reason: UnauthorizedReason) -> GateError {
    GateError::Unauthorized(reason)
}

/// The session id the claims are bound to
pub fn session_binding(claims: &TokenClaims) -> GateResult<&str> {
    claims
        .session_id
        .as_deref()
        .ok_or_else(|| reject(UnauthorizedReason::NoSessionBinding))
}

/// Reject tokens issued before the account's force-logout marker
///
/// `iat` only carries whole seconds, so the marker is compared at the same
/// precision: a token issued in the marker's own second is accepted.
pub fn check_force_logout(snapshot: &AccountSnapshot, issued_at: DateTime<Utc>) -> GateResult<()> {
    match snapshot.security.force_logout_at {
        Some(force_logout_at) if force_logout_at.trunc_subsecs(0) > issued_at => {
            Err(reject(UnauthorizedReason::InvalidatedBySecurityAction))
        }
        _ => Ok(()),
    }
}

/// Store-only resolver
#[derive(Clone)]
pub struct StoreResolver {
    store: Arc<dyn SessionStore>,
    clock: SharedClock,
}

impl StoreResolver {
    pub fn new(store: Arc<dyn SessionStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl ResolveSession for StoreResolver {
    async fn resolve(&self, claims: &TokenClaims) -> GateResult<AccountSnapshot> {
        let session_id = session_binding(claims)?;

        let found = match self.store.find_session_with_account(session_id).await {
            Ok(found) => found,
            Err(e) => {
                error!("Session lookup failed for {}: {}", session_id, e);
                metrics::record_store_lookup("error");
                return Err(reject(UnauthorizedReason::ValidationError));
            }
        };

        let Some(found) = found else {
            metrics::record_store_lookup("not_found");
            return Err(reject(UnauthorizedReason::SessionNotFound));
        };
        metrics::record_store_lookup("found");

        let session = found.session;
        if session.is_revoked {
            return Err(reject(UnauthorizedReason::SessionRevoked));
        }
        if session.expires_at <= self.clock.now() {
            return Err(reject(UnauthorizedReason::SessionExpired));
        }

        let Some(account) = found.account else {
            error!(
                "Session {} references missing account {}",
                session.id, session.owner_id
            );
            return Err(reject(UnauthorizedReason::AccountNotFound));
        };

        if account.public_id != claims.subject {
            error!(
                "Token subject {} does not own session {} (owner {})",
                claims.subject, session.id, account.public_id
            );
            return Err(reject(UnauthorizedReason::SubjectMismatch));
        }

        check_force_logout(&account, claims.issued_at)?;

        Ok(account)
    }
}

/// Cache-fronted resolver
///
/// Read order is combined tier, then validity and snapshot tiers, then the
/// inner resolver. Outcomes of the inner resolver are written back:
/// successes to all tiers, not-found and expired as negative validity,
/// revocation as negative validity and negative combined. Anomalies
/// (subject mismatch, missing account) and security-action rejections are
/// never cached.
#[derive(Clone)]
pub struct CachedResolver<R> {
    inner: R,
    cache: SessionCache,
}

impl<R: ResolveSession> CachedResolver<R> {
    pub fn new(inner: R, cache: SessionCache) -> Self {
        Self { inner, cache }
    }

    fn write_back(
        &self,
        ticket: WriteTicket,
        session_id: &str,
        outcome: &GateResult<AccountSnapshot>,
    ) {
        match outcome {
            Ok(snapshot) => {
                self.cache.put_validity(ticket, session_id, Validity::Valid);
                self.cache.put_snapshot(ticket, snapshot);
                self.cache.put_combined(
                    ticket,
                    session_id,
                    &CombinedEntry {
                        snapshot: Some(snapshot.clone()),
                        session_valid: true,
                    },
                );
            }
            Err(GateError::Unauthorized(UnauthorizedReason::SessionRevoked)) => {
                self.cache.put_validity(ticket, session_id, Validity::Invalid);
                self.cache.put_combined(
                    ticket,
                    session_id,
                    &CombinedEntry {
                        snapshot: None,
                        session_valid: false,
                    },
                );
            }
            Err(GateError::Unauthorized(
                UnauthorizedReason::SessionNotFound | UnauthorizedReason::SessionExpired,
            )) => {
                self.cache.put_validity(ticket, session_id, Validity::Invalid);
            }
            Err(_) => {}
        }
    }
}

#[async_trait]
impl<R: ResolveSession> ResolveSession for CachedResolver<R> {
    async fn resolve(&self, claims: &TokenClaims) -> GateResult<AccountSnapshot> {
        let session_id = session_binding(claims)?;
        // Taken before any read so an invalidation during the store lookup
        // discards what this resolution would write back
        let ticket = self.cache.write_ticket();

        match self.cache.lookup(session_id, &claims.subject).await {
            CacheLookup::Hit(snapshot) => {
                if snapshot.public_id != claims.subject {
                    debug!(
                        "Cached snapshot for session {} belongs to {}, not {}",
                        session_id, snapshot.public_id, claims.subject
                    );
                    return Err(reject(UnauthorizedReason::SubjectMismatch));
                }
                check_force_logout(&snapshot, claims.issued_at)?;
                return Ok(snapshot);
            }
            CacheLookup::Negative => {
                debug!("Session {} cached as invalid", session_id);
                return Err(reject(UnauthorizedReason::SessionInvalid));
            }
            CacheLookup::Miss => {}
        }

        let outcome = self.inner.resolve(claims).await;
        self.write_back(ticket, session_id, &outcome);
        outcome
    }
}
