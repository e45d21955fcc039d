//! Login guard: registration, credential checks, lockout, session lifecycle,
//! and the access-check entry point that front-ends call per request.
//!
//! Flow results are outcome enums, not errors. A rejected login or a denied
//! request is a normal answer; [`Error`] is reserved for storage and hashing
//! faults.

use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::account::{normalize_email, valid_email, Account, Identity, NewAccount, Role};
use crate::audit::{AdminAction, AdminActionKind, AuditRecorder, ClientInfo};
use crate::authz::{self, Decision, DenyReason, Resource, RouteTable};
use crate::config::AuthConfig;
use crate::dashboard::dashboard_for;
use crate::error::Error;
use crate::events::{AuthEvent, EventBus};
use crate::password::{hash_password, verify_password};
use crate::session::{generate_session_token, hash_session_token, idle_expired, Session};
use crate::store::{AccountStore, SessionStore};

const REASON_INVALID_CREDENTIALS: &str = "invalid credentials";
const REASON_DEACTIVATED: &str = "account deactivated";
const REASON_LOCKED: &str = "account locked";

#[derive(Clone, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: SecretString,
    pub remember_me: bool,
    pub client: ClientInfo,
}

/// Answer to a login attempt.
#[derive(Clone, Debug)]
pub enum LoginOutcome {
    Accepted {
        /// Raw session token, handed out exactly once.
        token: String,
        identity: Identity,
        /// Landing path for the account's role.
        dashboard: &'static str,
        expires_at: chrono::DateTime<Utc>,
    },
    Rejected(RejectReason),
}

/// Why a login was turned away. Deactivation and lockout are reported
/// distinctly so the login page can explain them; both are checked before the
/// password so the answer does not depend on credential correctness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    InvalidCredentials,
    AccountDeactivated,
    AccountLocked,
}

/// Resolution of a presented session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No such session, or its account is gone or deactivated.
    Missing,
    /// Session existed but hit its absolute or idle expiry and was removed.
    Expired,
    Active(Identity),
}

/// Per-request access answer: session resolution first, then authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessOutcome {
    /// `None` identity means the resource was public.
    Granted(Option<Identity>),
    /// The session expired on this request. Reported before any authorization
    /// verdict so the caller redirects to login rather than a 403.
    SessionExpired,
    Denied(DenyReason),
}

/// Result of an admin mutation against another account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminChange {
    Applied,
    /// Actor lacks the admin role.
    Denied,
    NotFound,
    /// Admins cannot deactivate their own account.
    SelfDeactivation,
}

/// The guard itself. Cheap to clone; stores are shared behind `Arc`.
#[derive(Clone)]
pub struct Auth {
    config: AuthConfig,
    routes: RouteTable,
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    audit: AuditRecorder,
    events: EventBus,
}

impl Auth {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            config: AuthConfig::default(),
            routes: RouteTable::default(),
            accounts,
            sessions,
            audit,
            events: EventBus::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[must_use]
    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Create an account. The email is normalized and format-checked here;
    /// uniqueness is enforced by the store.
    pub async fn register(&self, new_account: NewAccount) -> Result<Account, Error> {
        let email = normalize_email(&new_account.email);
        if !valid_email(&email) {
            return Err(Error::InvalidEmail);
        }
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash: hash_password(&new_account.password)?,
            role: new_account.role,
            first_name: new_account.first_name,
            last_name: new_account.last_name,
            phone_number: new_account.phone_number,
            department: new_account.department,
            is_active: true,
            email_verified: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_ip: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        self.accounts.insert(account.clone()).await?;
        info!(account_id = %account.id, role = account.role.as_str(), "account created");
        self.events.emit(&AuthEvent::AccountCreated {
            account_id: account.id,
            email,
            role: account.role,
            at: now,
        });
        Ok(account)
    }

    /// Bare credential check: lookup by normalized email plus hash
    /// comparison. No lockout enforcement, no counters, no audit; that
    /// layering belongs to [`Self::authenticate`].
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Option<Account>, Error> {
        let email = normalize_email(email);
        let Some(account) = self.accounts.find_by_email(&email).await? else {
            return Ok(None);
        };
        if verify_password(password, &account.password_hash)? {
            Ok(Some(account))
        } else {
            Ok(None)
        }
    }

    /// Run a login attempt end to end: account state, credentials, lockout
    /// bookkeeping, session issuance, audit, events.
    pub async fn authenticate(&self, request: LoginRequest) -> Result<LoginOutcome, Error> {
        let email = normalize_email(&request.email);
        let now = Utc::now();

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            self.audit
                .record_login_failure(None, &email, &request.client, REASON_INVALID_CREDENTIALS, now)
                .await;
            self.events.emit(&AuthEvent::LoginFailed {
                account_id: None,
                email_attempted: email,
                reason: REASON_INVALID_CREDENTIALS.to_string(),
                at: now,
            });
            return Ok(LoginOutcome::Rejected(RejectReason::InvalidCredentials));
        };

        if !account.is_active {
            self.reject(&account, &email, &request.client, REASON_DEACTIVATED, now)
                .await;
            return Ok(LoginOutcome::Rejected(RejectReason::AccountDeactivated));
        }

        // A live lockout short-circuits before the password is even looked
        // at; correct credentials do not reset the timer.
        if account.locked_at(now) {
            self.reject(&account, &email, &request.client, REASON_LOCKED, now)
                .await;
            return Ok(LoginOutcome::Rejected(RejectReason::AccountLocked));
        }

        if !verify_password(&request.password, &account.password_hash)? {
            let count = self
                .accounts
                .record_auth_failure(
                    account.id,
                    self.config.max_failed_attempts(),
                    now + self.config.lockout_duration(),
                )
                .await?;
            if count >= self.config.max_failed_attempts() {
                warn!(account_id = %account.id, failed_attempts = count, "account locked");
            }
            self.reject(&account, &email, &request.client, REASON_INVALID_CREDENTIALS, now)
                .await;
            return Ok(LoginOutcome::Rejected(RejectReason::InvalidCredentials));
        }

        self.accounts
            .record_auth_success(account.id, request.client.ip_address.as_deref(), now)
            .await?;

        let ttl = if request.remember_me {
            self.config.remember_me_ttl()
        } else {
            self.config.session_ttl()
        };
        let token = generate_session_token()?;
        let session = Session {
            id: Uuid::new_v4(),
            token_hash: hash_session_token(&token),
            account_id: account.id,
            remember_me: request.remember_me,
            created_at: now,
            expires_at: now + ttl,
            last_activity: Some(now),
        };
        let session_id = session.id;
        self.sessions.insert(session).await?;

        info!(account_id = %account.id, session_id = %session_id, "login accepted");
        self.audit
            .record_login(account.id, &email, &request.client, session_id, now)
            .await;
        self.events.emit(&AuthEvent::LoginSucceeded {
            account_id: account.id,
            email,
            session_id,
            at: now,
        });

        Ok(LoginOutcome::Accepted {
            token,
            dashboard: dashboard_for(account.role),
            identity: account.identity(),
            expires_at: now + ttl,
        })
    }

    /// End a session. Idempotent: an unknown or already-ended token is a
    /// successful logout.
    pub async fn logout(&self, token: &str) -> Result<(), Error> {
        let token_hash = hash_session_token(token);
        let Some(session) = self.sessions.find(&token_hash).await? else {
            return Ok(());
        };
        let now = Utc::now();
        self.sessions.delete(&token_hash).await?;
        self.audit
            .record_logout(session.account_id, session.id, now)
            .await;
        self.events.emit(&AuthEvent::LoggedOut {
            account_id: session.account_id,
            session_id: session.id,
            at: now,
        });
        Ok(())
    }

    /// Resolve a token to an identity, enforcing absolute and idle expiry and
    /// sliding the idle clock on success.
    pub async fn resolve(&self, token: &str) -> Result<SessionState, Error> {
        let token_hash = hash_session_token(token);
        let Some(session) = self.sessions.find(&token_hash).await? else {
            return Ok(SessionState::Missing);
        };
        let now = Utc::now();

        if now >= session.expires_at {
            self.expire(&session, &token_hash).await?;
            return Ok(SessionState::Expired);
        }
        // A missing last-activity stamp restarts the idle clock rather than
        // killing the session.
        if let Some(last) = session.last_activity {
            if idle_expired(last, now, self.config.idle_timeout()) {
                self.expire(&session, &token_hash).await?;
                return Ok(SessionState::Expired);
            }
        }
        self.sessions.touch(&token_hash, now).await?;

        match self.accounts.find_by_id(session.account_id).await? {
            Some(account) if account.is_active => Ok(SessionState::Active(account.identity())),
            // Deleted or deactivated mid-session: drop the session quietly.
            _ => {
                self.sessions.delete(&token_hash).await?;
                Ok(SessionState::Missing)
            }
        }
    }

    /// Per-request gate: resolve the session (if any), then authorize the
    /// classified resource. Expiry wins over every authorization verdict.
    pub async fn check_access(
        &self,
        token: Option<&str>,
        resource: &Resource,
    ) -> Result<AccessOutcome, Error> {
        let identity = match token {
            None => None,
            Some(token) => match self.resolve(token).await? {
                SessionState::Active(identity) => Some(identity),
                SessionState::Expired => return Ok(AccessOutcome::SessionExpired),
                SessionState::Missing => None,
            },
        };
        match authz::authorize(identity.as_ref(), resource) {
            Decision::Allow => Ok(AccessOutcome::Granted(identity)),
            Decision::Deny(reason) => Ok(AccessOutcome::Denied(reason)),
        }
    }

    /// Convenience over [`Self::check_access`] for path-shaped resources.
    pub async fn check_path(
        &self,
        token: Option<&str>,
        path: &str,
    ) -> Result<AccessOutcome, Error> {
        let resource = self.routes.classify(path);
        self.check_access(token, &resource).await
    }

    /// Activate or deactivate an account. Admin only; self-deactivation is
    /// refused so an admin cannot lock themselves out of the user list.
    pub async fn set_active(
        &self,
        actor: &Identity,
        target: Uuid,
        active: bool,
        client: &ClientInfo,
    ) -> Result<AdminChange, Error> {
        if actor.role != Role::Admin {
            return Ok(AdminChange::Denied);
        }
        if actor.id == target && !active {
            return Ok(AdminChange::SelfDeactivation);
        }
        let now = Utc::now();
        if !self.accounts.set_active(target, active, now).await? {
            return Ok(AdminChange::NotFound);
        }
        self.audit
            .record_admin_action(AdminAction {
                id: Uuid::new_v4(),
                actor_id: Some(actor.id),
                kind: AdminActionKind::Update,
                resource_type: "account".to_string(),
                resource_id: Some(target.to_string()),
                changes: json!({ "is_active": active }),
                ip_address: client.ip_address.clone(),
                at: now,
            })
            .await;
        Ok(AdminChange::Applied)
    }

    /// Change an account's role. Admin only; the diff lands in the audit
    /// trail.
    pub async fn set_role(
        &self,
        actor: &Identity,
        target: Uuid,
        role: Role,
        client: &ClientInfo,
    ) -> Result<AdminChange, Error> {
        if actor.role != Role::Admin {
            return Ok(AdminChange::Denied);
        }
        let Some(before) = self.accounts.find_by_id(target).await? else {
            return Ok(AdminChange::NotFound);
        };
        let now = Utc::now();
        if !self.accounts.set_role(target, role, now).await? {
            return Ok(AdminChange::NotFound);
        }
        self.audit
            .record_admin_action(AdminAction {
                id: Uuid::new_v4(),
                actor_id: Some(actor.id),
                kind: AdminActionKind::Update,
                resource_type: "account".to_string(),
                resource_id: Some(target.to_string()),
                changes: json!({
                    "role": { "from": before.role.as_str(), "to": role.as_str() }
                }),
                ip_address: client.ip_address.clone(),
                at: now,
            })
            .await;
        Ok(AdminChange::Applied)
    }

    async fn reject(
        &self,
        account: &Account,
        email: &str,
        client: &ClientInfo,
        reason: &str,
        now: chrono::DateTime<Utc>,
    ) {
        self.audit
            .record_login_failure(Some(account.id), email, client, reason, now)
            .await;
        self.events.emit(&AuthEvent::LoginFailed {
            account_id: Some(account.id),
            email_attempted: email.to_string(),
            reason: reason.to_string(),
            at: now,
        });
    }

    async fn expire(&self, session: &Session, token_hash: &[u8]) -> Result<(), Error> {
        let now = Utc::now();
        self.sessions.delete(token_hash).await?;
        self.audit
            .record_logout(session.account_id, session.id, now)
            .await;
        self.events.emit(&AuthEvent::SessionExpired {
            account_id: session.account_id,
            session_id: session.id,
            at: now,
        });
        Ok(())
    }
}
