//! Append-only audit trail: login events and admin actions.
//!
//! Writes are best-effort. A failed audit write is logged for operators and
//! swallowed so it can never fail the authentication flow it observes; reads
//! (the admin query surface) propagate errors normally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::error::Error;
use crate::store::AuditStore;

/// Request-boundary metadata. Opaque strings, stored as supplied; header
/// extraction (including forwarded-for preference) is the caller's job.
#[derive(Clone, Debug, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One login attempt and, for successes, its paired logout.
#[derive(Clone, Debug)]
pub struct LoginEvent {
    pub id: Uuid,
    /// Absent when the attempted email matched no account.
    pub account_id: Option<Uuid>,
    pub email_attempted: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<Uuid>,
    pub login_at: DateTime<Utc>,
    /// Set exactly once, on logout or forced expiry. Always >= `login_at`.
    pub logout_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminActionKind {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    View,
    Export,
    Import,
}

impl AdminActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::View => "view",
            Self::Export => "export",
            Self::Import => "import",
        }
    }
}

/// Generic admin action against an arbitrary resource type, with a JSON diff
/// payload. Never mutated after write.
#[derive(Clone, Debug)]
pub struct AdminAction {
    pub id: Uuid,
    /// `None` when the acting account has since been deleted.
    pub actor_id: Option<Uuid>,
    pub kind: AdminActionKind,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub changes: serde_json::Value,
    pub ip_address: Option<String>,
    pub at: DateTime<Utc>,
}

/// Filter for the read-only login-event query surface.
#[derive(Clone, Debug, Default)]
pub struct LoginEventFilter {
    pub account_id: Option<Uuid>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LoginEventFilter {
    #[must_use]
    pub fn matches(&self, event: &LoginEvent) -> bool {
        if let Some(account_id) = self.account_id {
            if event.account_id != Some(account_id) {
                return false;
            }
        }
        if let Some(success) = self.success {
            if event.success != success {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.login_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.login_at > to {
                return false;
            }
        }
        true
    }
}

/// Filter for the read-only admin-action query surface.
#[derive(Clone, Debug, Default)]
pub struct AdminActionFilter {
    pub actor_id: Option<Uuid>,
    pub kind: Option<AdminActionKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AdminActionFilter {
    #[must_use]
    pub fn matches(&self, action: &AdminAction) -> bool {
        if let Some(actor_id) = self.actor_id {
            if action.actor_id != Some(actor_id) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if action.kind != kind {
                return false;
            }
        }
        if let Some(from) = self.from {
            if action.at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if action.at > to {
                return false;
            }
        }
        true
    }
}

/// Best-effort writer over an [`AuditStore`].
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn record_login(
        &self,
        account_id: Uuid,
        email: &str,
        client: &ClientInfo,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) {
        let event = LoginEvent {
            id: Uuid::new_v4(),
            account_id: Some(account_id),
            email_attempted: email.to_string(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            session_id: Some(session_id),
            login_at: at,
            logout_at: None,
            success: true,
            failure_reason: None,
        };
        if let Err(err) = self.store.insert_login_event(event).await {
            error!("failed to record login event: {err}");
        }
    }

    pub async fn record_login_failure(
        &self,
        account_id: Option<Uuid>,
        email_attempted: &str,
        client: &ClientInfo,
        reason: &str,
        at: DateTime<Utc>,
    ) {
        let event = LoginEvent {
            id: Uuid::new_v4(),
            account_id,
            email_attempted: email_attempted.to_string(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            session_id: None,
            login_at: at,
            logout_at: None,
            success: false,
            failure_reason: Some(reason.to_string()),
        };
        if let Err(err) = self.store.insert_login_event(event).await {
            error!("failed to record login failure: {err}");
        }
    }

    /// Close the most recent open event for (account, session). Finding no
    /// open event is fine; logout proceeds either way.
    pub async fn record_logout(&self, account_id: Uuid, session_id: Uuid, at: DateTime<Utc>) {
        if let Err(err) = self.store.close_login_event(account_id, session_id, at).await {
            error!("failed to record logout: {err}");
        }
    }

    pub async fn record_admin_action(&self, action: AdminAction) {
        if let Err(err) = self.store.insert_admin_action(action).await {
            error!("failed to record admin action: {err}");
        }
    }

    /// Read-only query surface for compliance display.
    pub async fn login_events(&self, filter: &LoginEventFilter) -> Result<Vec<LoginEvent>, Error> {
        self.store.list_login_events(filter).await
    }

    pub async fn admin_actions(
        &self,
        filter: &AdminActionFilter,
    ) -> Result<Vec<AdminAction>, Error> {
        self.store.list_admin_actions(filter).await
    }
}
