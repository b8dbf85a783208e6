/// Session and account records used for authorization decisions
use crate::error::{GateError, GateResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
    Deleted,
    Deactivated,
    /// Registered but not yet confirmed
    Pending,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Banned => "banned",
            AccountStatus::Deleted => "deleted",
            AccountStatus::Deactivated => "deactivated",
            AccountStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> GateResult<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "banned" => Ok(AccountStatus::Banned),
            "deleted" => Ok(AccountStatus::Deleted),
            "deactivated" => Ok(AccountStatus::Deactivated),
            "pending" => Ok(AccountStatus::Pending),
            _ => Err(GateError::Internal(format!("Invalid account status: {}", s))),
        }
    }
}

/// Session record in the database
///
/// A session is live iff it is not revoked and has not expired. Liveness only
/// ever goes from live to not-live.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    pub is_revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

/// Security-relevant account fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityState {
    pub locked_until: Option<DateTime<Utc>>,
    /// Tokens issued before this instant are rejected
    pub force_logout_at: Option<DateTime<Utc>>,
    pub failed_login_count: i64,
}

/// Minimal projection of an account needed to authorize a request
///
/// Serialized as-is into the snapshot and combined cache tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub account_id: String,
    pub public_id: String,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
    pub status: AccountStatus,
    pub email_verified: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub security: SecurityState,
}

/// Lockout counters for one account
#[derive(Debug, Clone, PartialEq)]
pub struct LockoutState {
    pub failed_login_count: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_liveness() {
        let now = Utc::now();
        let mut session = Session {
            id: "s1".into(),
            owner_id: "a1".into(),
            is_revoked: false,
            expires_at: now + Duration::hours(1),
            last_active_at: now,
        };
        assert!(session.is_live(now));

        session.expires_at = now;
        assert!(!session.is_live(now));

        session.expires_at = now + Duration::hours(1);
        session.is_revoked = true;
        assert!(!session.is_live(now));
    }

    #[test]
    fn test_account_status_round_trip_names() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Suspended,
            AccountStatus::Banned,
            AccountStatus::Deleted,
            AccountStatus::Deactivated,
            AccountStatus::Pending,
        ] {
            assert_eq!(AccountStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(AccountStatus::from_str("frozen").is_err());
        assert_eq!(AccountStatus::from_str("BANNED").unwrap(), AccountStatus::Banned);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = AccountSnapshot {
            account_id: "a1".into(),
            public_id: "pub-1".into(),
            email: "a@example.com".into(),
            username: "alice".into(),
            display_name: None,
            role: "user".into(),
            status: AccountStatus::Active,
            email_verified: true,
            deleted_at: None,
            security: SecurityState::default(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["publicId"], "pub-1");
        assert_eq!(json["status"], "active");
        assert_eq!(json["security"]["failedLoginCount"], 0);
    }
}
