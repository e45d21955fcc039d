//! Storage traits for accounts, sessions, and the audit trail.
//!
//! Two implementations ship with the crate: [`memory::MemoryStore`] for tests
//! and embedding, and [`postgres::PostgresStore`] for production. All
//! mutations are single-row writes; no transaction spans more than one
//! component.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::account::{Account, Role};
use crate::audit::{AdminAction, AdminActionFilter, LoginEvent, LoginEventFilter};
use crate::error::Error;
use crate::session::Session;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a fully-built account record. Fails with
    /// [`Error::DuplicateEmail`] when the normalized email already exists.
    async fn insert(&self, account: Account) -> Result<(), Error>;

    /// Look up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, Error>;

    /// Reset the failed-attempt counter, clear any lockout, and stamp the
    /// last-login IP and time.
    async fn record_auth_success(
        &self,
        id: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Atomically increment the failed-attempt counter; when the new count
    /// reaches `threshold`, apply `locked_until`. Returns the new count.
    async fn record_auth_failure(
        &self,
        id: Uuid,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<u32, Error>;

    /// Soft activate/deactivate. Missing accounts are a no-op reported as
    /// `Ok(false)`.
    async fn set_active(&self, id: Uuid, active: bool, at: DateTime<Utc>) -> Result<bool, Error>;

    /// Change the stored role. Missing accounts are a no-op reported as
    /// `Ok(false)`.
    async fn set_role(&self, id: Uuid, role: Role, at: DateTime<Utc>) -> Result<bool, Error>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<(), Error>;

    /// Look up by token hash; expiry decisions belong to the guard, not the
    /// store.
    async fn find(&self, token_hash: &[u8]) -> Result<Option<Session>, Error>;

    /// Slide the idle clock forward.
    async fn touch(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<(), Error>;

    /// Delete is idempotent; deleting an absent session is fine.
    async fn delete(&self, token_hash: &[u8]) -> Result<(), Error>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_login_event(&self, event: LoginEvent) -> Result<(), Error>;

    /// Set the logout timestamp on the most recent open event for
    /// (account, session). No-op when no open event exists.
    async fn close_login_event(
        &self,
        account_id: Uuid,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    async fn insert_admin_action(&self, action: AdminAction) -> Result<(), Error>;

    async fn list_login_events(
        &self,
        filter: &LoginEventFilter,
    ) -> Result<Vec<LoginEvent>, Error>;

    async fn list_admin_actions(
        &self,
        filter: &AdminActionFilter,
    ) -> Result<Vec<AdminAction>, Error>;
}
