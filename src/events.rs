//! Typed, synchronous in-process event bus.
//!
//! Replaces the original platform's implicit signal hooks: listeners register
//! explicitly at startup and run inline on the emitting thread. Listener
//! work must be cheap; anything slow belongs on the listener's own executor.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::account::Role;

#[derive(Clone, Debug)]
pub enum AuthEvent {
    AccountCreated {
        account_id: Uuid,
        email: String,
        role: Role,
        at: DateTime<Utc>,
    },
    LoginSucceeded {
        account_id: Uuid,
        email: String,
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    LoginFailed {
        account_id: Option<Uuid>,
        email_attempted: String,
        reason: String,
        at: DateTime<Utc>,
    },
    LoggedOut {
        account_id: Uuid,
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    SessionExpired {
        account_id: Uuid,
        session_id: Uuid,
        at: DateTime<Utc>,
    },
}

pub trait EventListener: Send + Sync {
    fn handle(&self, event: &AuthEvent);
}

/// Immutable set of listeners, assembled at startup.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn emit(&self, event: &AuthEvent) {
        for listener in &self.listeners {
            listener.handle(event);
        }
    }
}
