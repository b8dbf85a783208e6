/// Progressive account lockout
///
/// Failed logins raise a per-account counter. Crossing a configured
/// threshold locks the account for that threshold's duration; higher
/// thresholds lock for longer. Idle counters erode through a periodic
/// decay sweep.
use crate::{
    clock::SharedClock,
    config::LockoutConfig,
    error::{GateError, GateResult},
    metrics,
    store::SessionStore,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One row of the lockout policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutThreshold {
    /// Failure count at which this row applies
    pub attempts: i64,
    pub lockout_minutes: i64,
}

impl LockoutThreshold {
    pub fn new(attempts: i64, lockout_minutes: i64) -> Self {
        Self {
            attempts,
            lockout_minutes,
        }
    }
}

/// Result of recording a failed login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutResult {
    pub failed_count: i64,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Current lock state of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    pub until: Option<DateTime<Utc>>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self {
            locked: false,
            until: None,
        }
    }
}

/// Lockout policy evaluated against the session store
#[derive(Clone)]
pub struct AccountLockGuard {
    store: Arc<dyn SessionStore>,
    clock: SharedClock,
    /// Sorted by `attempts`, highest first
    thresholds: Vec<LockoutThreshold>,
    decay_window: Duration,
}

impl AccountLockGuard {
    pub fn new(store: Arc<dyn SessionStore>, clock: SharedClock, config: &LockoutConfig) -> Self {
        let mut thresholds = config.thresholds.clone();
        thresholds.sort_by(|a, b| b.attempts.cmp(&a.attempts));

        Self {
            store,
            clock,
            thresholds,
            decay_window: Duration::minutes(config.decay_window_minutes),
        }
    }

    /// The highest threshold reached by `failed_count`
    pub fn threshold_for(&self, failed_count: i64) -> Option<&LockoutThreshold> {
        self.thresholds
            .iter()
            .find(|threshold| failed_count >= threshold.attempts)
    }

    /// Record one failed login for an account
    ///
    /// The increment happens in a single store write, so concurrent failures
    /// each count. An active lock is never replaced by one that ends sooner.
    pub async fn record_failure(&self, account_id: &str) -> GateResult<LockoutResult> {
        let now = self.clock.now();
        let state = self
            .store
            .increment_failed_login_count(account_id, now)
            .await?
            .ok_or_else(|| GateError::Internal(format!("Account not found: {}", account_id)))?;

        let failed_count = state.failed_login_count;
        let computed = self
            .threshold_for(failed_count)
            .map(|threshold| now + Duration::minutes(threshold.lockout_minutes));
        let active = state.locked_until.filter(|until| *until > now);

        let locked_until = match (active, computed) {
            (Some(active), Some(computed)) => Some(active.max(computed)),
            (active, computed) => computed.or(active),
        };

        if let Some(until) = computed {
            if active.map_or(true, |active| until > active) {
                self.store.extend_lock(account_id, until).await?;
                metrics::LOCKOUTS_APPLIED_TOTAL.inc();
            }
        }

        match locked_until {
            Some(until) => warn!(
                "Account {} locked until {} after {} failed logins",
                account_id, until, failed_count
            ),
            None => debug!("Account {} has {} failed logins", account_id, failed_count),
        }

        Ok(LockoutResult {
            failed_count,
            locked_until,
        })
    }

    /// Clear the counter and any lock, as after a successful login or admin unlock
    pub async fn unlock(&self, account_id: &str) -> GateResult<()> {
        self.store
            .update_failed_login_count(account_id, 0, None, self.clock.now())
            .await?;
        debug!("Cleared login failures for {}", account_id);
        Ok(())
    }

    /// Report whether the account is locked
    ///
    /// An expired lock is cleared together with the failure counter.
    pub async fn is_locked(&self, account_id: &str) -> GateResult<LockStatus> {
        let now = self.clock.now();
        let Some(state) = self.store.get_lockout_state(account_id).await? else {
            return Ok(LockStatus::unlocked());
        };

        match state.locked_until {
            Some(until) if until > now => Ok(LockStatus {
                locked: true,
                until: Some(until),
            }),
            Some(_) => {
                // Conditional, so a lock applied since the read survives
                if self.store.clear_expired_lock(account_id, now).await? {
                    info!("Lock on account {} expired, counter reset", account_id);
                }
                Ok(LockStatus::unlocked())
            }
            None => Ok(LockStatus::unlocked()),
        }
    }

    /// Forgive one failure on every idle, unlocked account
    ///
    /// Each qualifying account is decremented exactly once per sweep no
    /// matter how long it has been idle. Returns the number decremented.
    pub async fn decay_sweep(&self) -> GateResult<u64> {
        let now = self.clock.now();
        let threshold = now - self.decay_window;
        let accounts = self.store.find_accounts_needing_decay(threshold).await?;

        let mut decremented = 0;
        for account_id in accounts {
            match self
                .store
                .decrement_failed_login_count(&account_id, now)
                .await
            {
                Ok(true) => decremented += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to decay login failures for {}: {}", account_id, e),
            }
        }

        metrics::DECAY_DECREMENTS_TOTAL.inc_by(decremented);
        Ok(decremented)
    }
}
