//! Postgres store. Single-row statements, each wrapped in a `db.query` span.
//!
//! Schema lives in `sql/schema.sql`. JSON payloads cross the wire as text
//! cast to `jsonb`, so no raw JSON values are bound.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::account::{Account, Role};
use crate::audit::{AdminAction, AdminActionFilter, LoginEvent, LoginEventFilter};
use crate::error::Error;
use crate::session::Session;

use super::{AccountStore, AuditStore, SessionStore};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: Role::parse_lossy(row.get("role")),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone_number: row.get("phone_number"),
        department: row.get("department"),
        is_active: row.get("is_active"),
        email_verified: row.get("email_verified"),
        failed_login_attempts: u32::try_from(row.get::<i32, _>("failed_login_attempts"))
            .unwrap_or(0),
        locked_until: row.get("locked_until"),
        last_login_ip: row.get("last_login_ip"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn login_event_from_row(row: &sqlx::postgres::PgRow) -> LoginEvent {
    LoginEvent {
        id: row.get("id"),
        account_id: row.get("account_id"),
        email_attempted: row.get("email_attempted"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        session_id: row.get("session_id"),
        login_at: row.get("login_at"),
        logout_at: row.get("logout_at"),
        success: row.get("success"),
        failure_reason: row.get("failure_reason"),
    }
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, role, first_name, last_name, \
     phone_number, department, is_active, email_verified, failed_login_attempts, \
     locked_until, last_login_ip, last_login_at, created_at, updated_at";

#[async_trait]
impl AccountStore for PostgresStore {
    async fn insert(&self, account: Account) -> Result<(), Error> {
        let query = r"
            INSERT INTO accounts
                (id, email, password_hash, role, first_name, last_name,
                 phone_number, department, is_active, email_verified,
                 failed_login_attempts, locked_until, last_login_ip,
                 last_login_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(&account.phone_number)
            .bind(&account.department)
            .bind(account.is_active)
            .bind(account.email_verified)
            .bind(i32::try_from(account.failed_login_attempts).unwrap_or(i32::MAX))
            .bind(account.locked_until)
            .bind(&account.last_login_ip)
            .bind(account.last_login_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(Error::DuplicateEmail),
            Err(err) => Err(Error::Storage(
                anyhow::Error::new(err).context("failed to insert account"),
            )),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by email")?;
        Ok(row.as_ref().map(account_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, Error> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by id")?;
        Ok(row.as_ref().map(account_from_row))
    }

    async fn record_auth_success(
        &self,
        id: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let query = r"
            UPDATE accounts
            SET failed_login_attempts = 0,
                locked_until = NULL,
                last_login_ip = $2,
                last_login_at = $3,
                updated_at = $3
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(ip)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record auth success")?;
        Ok(())
    }

    async fn record_auth_failure(
        &self,
        id: Uuid,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<u32, Error> {
        // Counter increment and conditional lockout happen in one statement
        // so concurrent failures cannot drop an increment.
        let query = r"
            UPDATE accounts
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE locked_until
                END,
                updated_at = $4
            WHERE id = $1
            RETURNING failed_login_attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .bind(i32::try_from(threshold).unwrap_or(i32::MAX))
            .bind(locked_until)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to record auth failure")?;
        Ok(row
            .map(|row| u32::try_from(row.get::<i32, _>("failed_login_attempts")).unwrap_or(0))
            .unwrap_or(0))
    }

    async fn set_active(&self, id: Uuid, active: bool, at: DateTime<Utc>) -> Result<bool, Error> {
        let query = "UPDATE accounts SET is_active = $2, updated_at = $3 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(active)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update active flag")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_role(&self, id: Uuid, role: Role, at: DateTime<Utc>) -> Result<bool, Error> {
        let query = "UPDATE accounts SET role = $2, updated_at = $3 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(role.as_str())
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update role")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn insert(&self, session: Session) -> Result<(), Error> {
        let query = r"
            INSERT INTO sessions
                (id, token_hash, account_id, remember_me, created_at,
                 expires_at, last_activity)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session.id)
            .bind(&session.token_hash)
            .bind(session.account_id)
            .bind(session.remember_me)
            .bind(session.created_at)
            .bind(session.expires_at)
            .bind(session.last_activity)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn find(&self, token_hash: &[u8]) -> Result<Option<Session>, Error> {
        let query = r"
            SELECT id, token_hash, account_id, remember_me, created_at,
                   expires_at, last_activity
            FROM sessions
            WHERE token_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        Ok(row.map(|row| Session {
            id: row.get("id"),
            token_hash: row.get("token_hash"),
            account_id: row.get("account_id"),
            remember_me: row.get("remember_me"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            last_activity: row.get("last_activity"),
        }))
    }

    async fn touch(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<(), Error> {
        let query = "UPDATE sessions SET last_activity = $2 WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update session activity")?;
        Ok(())
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<(), Error> {
        // Idempotent; zero rows deleted is fine.
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn insert_login_event(&self, event: LoginEvent) -> Result<(), Error> {
        let query = r"
            INSERT INTO login_events
                (id, account_id, email_attempted, ip_address, user_agent,
                 session_id, login_at, logout_at, success, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(event.id)
            .bind(event.account_id)
            .bind(&event.email_attempted)
            .bind(&event.ip_address)
            .bind(&event.user_agent)
            .bind(event.session_id)
            .bind(event.login_at)
            .bind(event.logout_at)
            .bind(event.success)
            .bind(&event.failure_reason)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert login event")?;
        Ok(())
    }

    async fn close_login_event(
        &self,
        account_id: Uuid,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let query = r"
            UPDATE login_events
            SET logout_at = GREATEST($3, login_at)
            WHERE id = (
                SELECT id FROM login_events
                WHERE account_id = $1
                  AND session_id = $2
                  AND logout_at IS NULL
                ORDER BY login_at DESC
                LIMIT 1
            )
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(session_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to close login event")?;
        Ok(())
    }

    async fn insert_admin_action(&self, action: AdminAction) -> Result<(), Error> {
        let changes =
            serde_json::to_string(&action.changes).context("failed to serialize action diff")?;
        let query = r"
            INSERT INTO admin_actions
                (id, actor_id, action, resource_type, resource_id, changes,
                 ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6::jsonb, $7, $8)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(action.id)
            .bind(action.actor_id)
            .bind(action.kind.as_str())
            .bind(&action.resource_type)
            .bind(&action.resource_id)
            .bind(changes)
            .bind(&action.ip_address)
            .bind(action.at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert admin action")?;
        Ok(())
    }

    async fn list_login_events(
        &self,
        filter: &LoginEventFilter,
    ) -> Result<Vec<LoginEvent>, Error> {
        let query = r"
            SELECT id, account_id, email_attempted, ip_address, user_agent,
                   session_id, login_at, logout_at, success, failure_reason
            FROM login_events
            WHERE ($1::uuid IS NULL OR account_id = $1)
              AND ($2::boolean IS NULL OR success = $2)
              AND ($3::timestamptz IS NULL OR login_at >= $3)
              AND ($4::timestamptz IS NULL OR login_at <= $4)
            ORDER BY login_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(filter.account_id)
            .bind(filter.success)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list login events")?;
        Ok(rows.iter().map(login_event_from_row).collect())
    }

    async fn list_admin_actions(
        &self,
        filter: &AdminActionFilter,
    ) -> Result<Vec<AdminAction>, Error> {
        let query = r"
            SELECT id, actor_id, action, resource_type, resource_id,
                   changes::text AS changes, ip_address, created_at
            FROM admin_actions
            WHERE ($1::uuid IS NULL OR actor_id = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(filter.actor_id)
            .bind(filter.kind.map(crate::audit::AdminActionKind::as_str))
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list admin actions")?;

        let mut actions = Vec::with_capacity(rows.len());
        for row in &rows {
            let changes: String = row.get("changes");
            let changes = serde_json::from_str(&changes)
                .context("failed to parse stored action diff")?;
            actions.push(AdminAction {
                id: row.get("id"),
                actor_id: row.get("actor_id"),
                kind: parse_action_kind(row.get("action")),
                resource_type: row.get("resource_type"),
                resource_id: row.get("resource_id"),
                changes,
                ip_address: row.get("ip_address"),
                at: row.get("created_at"),
            });
        }
        Ok(actions)
    }
}

fn parse_action_kind(value: &str) -> crate::audit::AdminActionKind {
    use crate::audit::AdminActionKind;
    match value {
        "create" => AdminActionKind::Create,
        "delete" => AdminActionKind::Delete,
        "login" => AdminActionKind::Login,
        "logout" => AdminActionKind::Logout,
        "view" => AdminActionKind::View,
        "export" => AdminActionKind::Export,
        "import" => AdminActionKind::Import,
        _ => AdminActionKind::Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn action_kind_round_trips_storage_values() {
        use crate::audit::AdminActionKind;
        for kind in [
            AdminActionKind::Create,
            AdminActionKind::Update,
            AdminActionKind::Delete,
            AdminActionKind::Login,
            AdminActionKind::Logout,
            AdminActionKind::View,
            AdminActionKind::Export,
            AdminActionKind::Import,
        ] {
            assert_eq!(parse_action_kind(kind.as_str()), kind);
        }
    }
}
