/// Persistent session/account store
///
/// The store is the authoritative source for every authorization decision;
/// caches only sit in front of it. Backends implement [`SessionStore`].

pub mod memory;
pub mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

use crate::db::account::{AccountSnapshot, LockoutState, Session};
use crate::error::GateResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A session joined with its owning account
///
/// `account` is `None` only when referential integrity has been broken.
#[derive(Debug, Clone)]
pub struct SessionWithAccount {
    pub session: Session,
    pub account: Option<AccountSnapshot>,
}

/// Storage backend trait
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session and its owner in a single lookup
    async fn find_session_with_account(
        &self,
        session_id: &str,
    ) -> GateResult<Option<SessionWithAccount>>;

    /// Set the session's last-active timestamp
    async fn update_session_last_active(&self, session_id: &str, at: DateTime<Utc>)
        -> GateResult<()>;

    /// Read the lockout counters of an account
    async fn get_lockout_state(&self, account_id: &str) -> GateResult<Option<LockoutState>>;

    /// Overwrite the lockout counters of an account
    async fn update_failed_login_count(
        &self,
        account_id: &str,
        count: i64,
        locked_until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> GateResult<()>;

    /// Add one failed login and return the counters as written
    ///
    /// A lock that has expired by `at` is dropped in the same write. Returns
    /// `None` for an unknown account.
    async fn increment_failed_login_count(
        &self,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> GateResult<Option<LockoutState>>;

    /// Lock the account until `until` unless it is already locked for longer
    async fn extend_lock(&self, account_id: &str, until: DateTime<Utc>) -> GateResult<()>;

    /// Reset counter and lock, but only if the lock has expired by `at`
    ///
    /// Returns whether a row changed.
    async fn clear_expired_lock(&self, account_id: &str, at: DateTime<Utc>) -> GateResult<bool>;

    /// Accounts with a positive failure count, no lock, and no update since `threshold`
    async fn find_accounts_needing_decay(&self, threshold: DateTime<Utc>)
        -> GateResult<Vec<String>>;

    /// Lower the failure count by one, never below zero
    ///
    /// Returns whether a row changed.
    async fn decrement_failed_login_count(&self, account_id: &str, at: DateTime<Utc>)
        -> GateResult<bool>;
}
