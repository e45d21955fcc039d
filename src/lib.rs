//! Role-based authorization and account-security core for the NEXAS NGO
//! platform: credential storage, login guard with lockout, server-side
//! sessions with idle expiry, route authorization, dashboard routing, and an
//! append-only audit trail.
//!
//! The crate is web-framework agnostic. A front-end hands tokens and request
//! paths to [`guard::Auth`] and acts on the returned outcome enums; storage
//! is pluggable through the traits in [`store`].

pub mod account;
pub mod audit;
pub mod authz;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod guard;
pub mod password;
pub mod session;
pub mod store;

pub use account::{Account, Identity, NewAccount, Permission, Role};
pub use audit::{AuditRecorder, ClientInfo};
pub use authz::{Decision, DenyReason, Resource, RouteTable};
pub use config::AuthConfig;
pub use error::Error;
pub use events::{AuthEvent, EventBus, EventListener};
pub use guard::{
    AccessOutcome, AdminChange, Auth, LoginOutcome, LoginRequest, RejectReason, SessionState,
};
