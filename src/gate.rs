/// Post-resolution account checks
///
/// Decides whether a resolved account may act right now. Rules are checked
/// in order and the first match wins; no I/O.
use crate::{
    db::account::{AccountSnapshot, AccountStatus},
    error::{GateError, GateResult},
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGate;

impl AccessGate {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> GateResult<()> {
        if snapshot.deleted_at.is_some() || snapshot.status == AccountStatus::Deleted {
            return Err(GateError::Forbidden("account deleted".to_string()));
        }

        match snapshot.status {
            AccountStatus::Suspended | AccountStatus::Banned | AccountStatus::Deactivated => {
                return Err(GateError::Forbidden(format!(
                    "account {}",
                    snapshot.status.as_str()
                )));
            }
            _ => {}
        }

        if let Some(locked_until) = snapshot.security.locked_until {
            if locked_until > now {
                return Err(GateError::Forbidden(format!(
                    "account locked until {}",
                    locked_until.to_rfc3339()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::account::SecurityState;
    use chrono::Duration;

    fn snapshot(status: AccountStatus) -> AccountSnapshot {
        AccountSnapshot {
            account_id: "a1".into(),
            public_id: "pub-1".into(),
            email: "alice@example.com".into(),
            username: "alice".into(),
            display_name: None,
            role: "user".into(),
            status,
            email_verified: true,
            deleted_at: None,
            security: SecurityState::default(),
        }
    }

    fn forbidden_message(result: GateResult<()>) -> String {
        match result {
            Err(GateError::Forbidden(msg)) => msg,
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_active_and_pending_accounts_pass() {
        let gate = AccessGate::new();
        let now = Utc::now();
        assert!(gate.check(&snapshot(AccountStatus::Active), now).is_ok());
        assert!(gate.check(&snapshot(AccountStatus::Pending), now).is_ok());
    }

    #[test]
    fn test_blocked_statuses() {
        let gate = AccessGate::new();
        let now = Utc::now();
        assert_eq!(
            forbidden_message(gate.check(&snapshot(AccountStatus::Suspended), now)),
            "account suspended"
        );
        assert_eq!(
            forbidden_message(gate.check(&snapshot(AccountStatus::Banned), now)),
            "account banned"
        );
        assert_eq!(
            forbidden_message(gate.check(&snapshot(AccountStatus::Deactivated), now)),
            "account deactivated"
        );
    }

    #[test]
    fn test_deleted_wins_over_status_and_lock() {
        let gate = AccessGate::new();
        let now = Utc::now();
        let mut account = snapshot(AccountStatus::Banned);
        account.deleted_at = Some(now - Duration::days(1));
        account.security.locked_until = Some(now + Duration::minutes(5));
        assert_eq!(forbidden_message(gate.check(&account, now)), "account deleted");

        let account = snapshot(AccountStatus::Deleted);
        assert_eq!(forbidden_message(gate.check(&account, now)), "account deleted");
    }

    #[test]
    fn test_lock_only_applies_while_in_future() {
        let gate = AccessGate::new();
        let now = Utc::now();
        let mut account = snapshot(AccountStatus::Active);

        account.security.locked_until = Some(now + Duration::minutes(5));
        assert!(forbidden_message(gate.check(&account, now)).starts_with("account locked until"));

        account.security.locked_until = Some(now);
        assert!(gate.check(&account, now).is_ok());
    }
}
