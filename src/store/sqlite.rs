/// SQLite-backed session store using runtime queries
use crate::{
    db::account::{AccountSnapshot, AccountStatus, LockoutState, SecurityState, Session},
    error::{GateError, GateResult},
    store::{SessionStore, SessionWithAccount},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Session store over the account database
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

fn account_from_row(row: &SqliteRow) -> GateResult<Option<AccountSnapshot>> {
    let account_id: Option<String> = row.try_get("a_id")?;
    let Some(account_id) = account_id else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;

    Ok(Some(AccountSnapshot {
        account_id,
        public_id: row.try_get("public_id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        role: row.try_get("role")?,
        status: AccountStatus::from_str(&status)?,
        email_verified: row.try_get("email_verified")?,
        deleted_at: row.try_get("deleted_at")?,
        security: SecurityState {
            locked_until: row.try_get("locked_until")?,
            force_logout_at: row.try_get("force_logout_at")?,
            failed_login_count: row.try_get("failed_login_count")?,
        },
    }))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find_session_with_account(
        &self,
        session_id: &str,
    ) -> GateResult<Option<SessionWithAccount>> {
        let row = sqlx::query(
            r#"
            SELECT s.id, s.account_id, s.is_revoked, s.expires_at, s.last_active_at,
                   a.id AS a_id, a.public_id, a.email, a.username, a.display_name,
                   a.role, a.status, a.email_verified, a.deleted_at,
                   a.locked_until, a.force_logout_at, a.failed_login_count
            FROM session s
            LEFT JOIN account a ON a.id = s.account_id
            WHERE s.id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let session = Session {
            id: row.try_get("id")?,
            owner_id: row.try_get("account_id")?,
            is_revoked: row.try_get("is_revoked")?,
            expires_at: row.try_get("expires_at")?,
            last_active_at: row.try_get("last_active_at")?,
        };
        let account = account_from_row(&row)?;

        Ok(Some(SessionWithAccount { session, account }))
    }

    async fn update_session_last_active(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> GateResult<()> {
        sqlx::query("UPDATE session SET last_active_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(())
    }

    async fn get_lockout_state(&self, account_id: &str) -> GateResult<Option<LockoutState>> {
        let row = sqlx::query(
            "SELECT failed_login_count, locked_until, updated_at FROM account WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        match row {
            Some(row) => Ok(Some(LockoutState {
                failed_login_count: row.try_get("failed_login_count")?,
                locked_until: row.try_get("locked_until")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn update_failed_login_count(
        &self,
        account_id: &str,
        count: i64,
        locked_until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> GateResult<()> {
        sqlx::query(
            "UPDATE account SET failed_login_count = ?1, locked_until = ?2, updated_at = ?3
             WHERE id = ?4",
        )
        .bind(count)
        .bind(locked_until)
        .bind(at)
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(())
    }

    async fn increment_failed_login_count(
        &self,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> GateResult<Option<LockoutState>> {
        let row = sqlx::query(
            r#"
            UPDATE account
            SET failed_login_count = failed_login_count + 1,
                locked_until = CASE WHEN locked_until <= ?1 THEN NULL ELSE locked_until END,
                updated_at = ?1
            WHERE id = ?2
            RETURNING failed_login_count, locked_until, updated_at
            "#,
        )
        .bind(at)
        .bind(account_id)
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        match row {
            Some(row) => Ok(Some(LockoutState {
                failed_login_count: row.try_get("failed_login_count")?,
                locked_until: row.try_get("locked_until")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn extend_lock(&self, account_id: &str, until: DateTime<Utc>) -> GateResult<()> {
        sqlx::query(
            "UPDATE account SET locked_until = ?1
             WHERE id = ?2 AND (locked_until IS NULL OR locked_until < ?1)",
        )
        .bind(until)
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(())
    }

    async fn clear_expired_lock(&self, account_id: &str, at: DateTime<Utc>) -> GateResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET failed_login_count = 0, locked_until = NULL, updated_at = ?1
             WHERE id = ?2 AND locked_until IS NOT NULL AND locked_until <= ?1",
        )
        .bind(at)
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_accounts_needing_decay(
        &self,
        threshold: DateTime<Utc>,
    ) -> GateResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM account
            WHERE failed_login_count > 0 AND locked_until IS NULL AND updated_at < ?1
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.db)
        .await
        .map_err(GateError::Database)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("id").map_err(GateError::Database))
            .collect()
    }

    async fn decrement_failed_login_count(
        &self,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> GateResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET failed_login_count = failed_login_count - 1, updated_at = ?1
             WHERE id = ?2 AND failed_login_count > 0",
        )
        .bind(at)
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
