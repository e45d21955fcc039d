//! In-memory store for tests and single-process embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::account::{Account, Role};
use crate::audit::{AdminAction, AdminActionFilter, LoginEvent, LoginEventFilter};
use crate::error::Error;
use crate::session::Session;

use super::{AccountStore, AuditStore, SessionStore};

/// All three stores behind one value, so a test can hand the same `Arc` to
/// the guard three times.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
    sessions: Mutex<HashMap<Vec<u8>, Session>>,
    login_events: Mutex<Vec<LoginEvent>>,
    admin_actions: Mutex<Vec<AdminAction>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert(&self, account: Account) -> Result<(), Error> {
        let mut accounts = self.accounts.lock().await;
        if accounts.values().any(|existing| existing.email == account.email) {
            return Err(Error::DuplicateEmail);
        }
        accounts.insert(account.id, account);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, Error> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn record_auth_success(
        &self,
        id: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.get_mut(&id) {
            account.failed_login_attempts = 0;
            account.locked_until = None;
            account.last_login_ip = ip.map(str::to_string);
            account.last_login_at = Some(at);
            account.updated_at = at;
        }
        Ok(())
    }

    async fn record_auth_failure(
        &self,
        id: Uuid,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(0);
        };
        account.failed_login_attempts += 1;
        if account.failed_login_attempts >= threshold {
            account.locked_until = Some(locked_until);
        }
        account.updated_at = Utc::now();
        Ok(account.failed_login_attempts)
    }

    async fn set_active(&self, id: Uuid, active: bool, at: DateTime<Utc>) -> Result<bool, Error> {
        let mut accounts = self.accounts.lock().await;
        match accounts.get_mut(&id) {
            Some(account) => {
                account.is_active = active;
                account.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_role(&self, id: Uuid, role: Role, at: DateTime<Utc>) -> Result<bool, Error> {
        let mut accounts = self.accounts.lock().await;
        match accounts.get_mut(&id) {
            Some(account) => {
                account.role = role;
                account.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: Session) -> Result<(), Error> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn find(&self, token_hash: &[u8]) -> Result<Option<Session>, Error> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(token_hash).cloned())
    }

    async fn touch(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<(), Error> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(token_hash) {
            session.last_activity = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<(), Error> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(token_hash);
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_login_event(&self, event: LoginEvent) -> Result<(), Error> {
        let mut events = self.login_events.lock().await;
        events.push(event);
        Ok(())
    }

    async fn close_login_event(
        &self,
        account_id: Uuid,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut events = self.login_events.lock().await;
        // Most recent open record wins; older strays stay untouched.
        if let Some(event) = events
            .iter_mut()
            .rev()
            .find(|event| {
                event.account_id == Some(account_id)
                    && event.session_id == Some(session_id)
                    && event.logout_at.is_none()
            })
        {
            event.logout_at = Some(at.max(event.login_at));
        }
        Ok(())
    }

    async fn insert_admin_action(&self, action: AdminAction) -> Result<(), Error> {
        let mut actions = self.admin_actions.lock().await;
        actions.push(action);
        Ok(())
    }

    async fn list_login_events(
        &self,
        filter: &LoginEventFilter,
    ) -> Result<Vec<LoginEvent>, Error> {
        let events = self.login_events.lock().await;
        Ok(events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect())
    }

    async fn list_admin_actions(
        &self,
        filter: &AdminActionFilter,
    ) -> Result<Vec<AdminAction>, Error> {
        let actions = self.admin_actions.lock().await;
        Ok(actions
            .iter()
            .filter(|action| filter.matches(action))
            .cloned()
            .collect())
    }
}
