/// In-process session store
///
/// Keeps sessions and accounts in maps behind a mutex. Counts lookups so
/// callers can observe how often the authoritative path was taken, and can be
/// switched into a failing mode to simulate an unreachable database.
use crate::{
    db::account::{AccountSnapshot, LockoutState, Session},
    error::{GateError, GateResult},
    store::{SessionStore, SessionWithAccount},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct AccountRow {
    snapshot: AccountSnapshot,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, Session>,
    accounts: HashMap<String, AccountRow>,
}

#[derive(Default)]
struct Counters {
    session_lookups: AtomicUsize,
    activity_updates: AtomicUsize,
}

/// Map-backed [`SessionStore`]
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    tables: Arc<Mutex<Tables>>,
    counters: Arc<Counters>,
    failing: Arc<AtomicBool>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> GateResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GateError::Internal("session store unavailable".to_string()));
        }
        Ok(())
    }

    pub fn insert_account(&self, snapshot: AccountSnapshot, updated_at: DateTime<Utc>) {
        self.tables().accounts.insert(
            snapshot.account_id.clone(),
            AccountRow {
                snapshot,
                updated_at,
            },
        );
    }

    pub fn insert_session(&self, session: Session) {
        self.tables().sessions.insert(session.id.clone(), session);
    }

    pub fn remove_account(&self, account_id: &str) {
        self.tables().accounts.remove(account_id);
    }

    pub fn revoke_session(&self, session_id: &str) {
        if let Some(session) = self.tables().sessions.get_mut(session_id) {
            session.is_revoked = true;
        }
    }

    /// Apply an arbitrary change to an account row
    pub fn update_account<F>(&self, account_id: &str, f: F)
    where
        F: FnOnce(&mut AccountSnapshot),
    {
        if let Some(row) = self.tables().accounts.get_mut(account_id) {
            f(&mut row.snapshot);
        }
    }

    pub fn account(&self, account_id: &str) -> Option<AccountSnapshot> {
        self.tables()
            .accounts
            .get(account_id)
            .map(|row| row.snapshot.clone())
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.tables().sessions.get(session_id).cloned()
    }

    /// Number of `find_session_with_account` calls served
    pub fn session_lookups(&self) -> usize {
        self.counters.session_lookups.load(Ordering::SeqCst)
    }

    /// Number of last-active writes served
    pub fn activity_updates(&self) -> usize {
        self.counters.activity_updates.load(Ordering::SeqCst)
    }

    /// Make every operation fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_session_with_account(
        &self,
        session_id: &str,
    ) -> GateResult<Option<SessionWithAccount>> {
        self.counters.session_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let tables = self.tables();
        let Some(session) = tables.sessions.get(session_id).cloned() else {
            return Ok(None);
        };
        let account = tables
            .accounts
            .get(&session.owner_id)
            .map(|row| row.snapshot.clone());

        Ok(Some(SessionWithAccount { session, account }))
    }

    async fn update_session_last_active(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> GateResult<()> {
        self.check_available()?;
        self.counters.activity_updates.fetch_add(1, Ordering::SeqCst);

        if let Some(session) = self.tables().sessions.get_mut(session_id) {
            session.last_active_at = at;
        }
        Ok(())
    }

    async fn get_lockout_state(&self, account_id: &str) -> GateResult<Option<LockoutState>> {
        self.check_available()?;

        Ok(self.tables().accounts.get(account_id).map(|row| LockoutState {
            failed_login_count: row.snapshot.security.failed_login_count,
            locked_until: row.snapshot.security.locked_until,
            updated_at: row.updated_at,
        }))
    }

    async fn update_failed_login_count(
        &self,
        account_id: &str,
        count: i64,
        locked_until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> GateResult<()> {
        self.check_available()?;

        if let Some(row) = self.tables().accounts.get_mut(account_id) {
            row.snapshot.security.failed_login_count = count;
            row.snapshot.security.locked_until = locked_until;
            row.updated_at = at;
        }
        Ok(())
    }

    async fn increment_failed_login_count(
        &self,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> GateResult<Option<LockoutState>> {
        self.check_available()?;

        let mut tables = self.tables();
        let Some(row) = tables.accounts.get_mut(account_id) else {
            return Ok(None);
        };
        let security = &mut row.snapshot.security;
        security.failed_login_count += 1;
        if security.locked_until.is_some_and(|until| until <= at) {
            security.locked_until = None;
        }
        row.updated_at = at;

        Ok(Some(LockoutState {
            failed_login_count: security.failed_login_count,
            locked_until: security.locked_until,
            updated_at: at,
        }))
    }

    async fn extend_lock(&self, account_id: &str, until: DateTime<Utc>) -> GateResult<()> {
        self.check_available()?;

        if let Some(row) = self.tables().accounts.get_mut(account_id) {
            let security = &mut row.snapshot.security;
            if security.locked_until.map_or(true, |current| current < until) {
                security.locked_until = Some(until);
            }
        }
        Ok(())
    }

    async fn clear_expired_lock(&self, account_id: &str, at: DateTime<Utc>) -> GateResult<bool> {
        self.check_available()?;

        match self.tables().accounts.get_mut(account_id) {
            Some(row) if row.snapshot.security.locked_until.is_some_and(|until| until <= at) => {
                row.snapshot.security.failed_login_count = 0;
                row.snapshot.security.locked_until = None;
                row.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_accounts_needing_decay(
        &self,
        threshold: DateTime<Utc>,
    ) -> GateResult<Vec<String>> {
        self.check_available()?;

        let mut ids: Vec<String> = self
            .tables()
            .accounts
            .values()
            .filter(|row| {
                row.snapshot.security.failed_login_count > 0
                    && row.snapshot.security.locked_until.is_none()
                    && row.updated_at < threshold
            })
            .map(|row| row.snapshot.account_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn decrement_failed_login_count(
        &self,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> GateResult<bool> {
        self.check_available()?;

        match self.tables().accounts.get_mut(account_id) {
            Some(row) if row.snapshot.security.failed_login_count > 0 => {
                row.snapshot.security.failed_login_count -= 1;
                row.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
