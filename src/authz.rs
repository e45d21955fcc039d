//! Role authorization engine.
//!
//! Resources are classified before any rule runs; the rules then evaluate in
//! a fixed precedence order (public, authentication, admin-only, dashboard,
//! owner, default-allow). The route table is built once at startup and shared
//! immutably.

use uuid::Uuid;

use crate::account::{Identity, Permission, Role};

/// Classification of a requested resource. Classification is the caller's
/// responsibility for identity-scoped resources (`SelfOrAdmin`); path-shaped
/// resources come out of [`RouteTable::classify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    /// No checks at all, even unauthenticated.
    Public,
    /// User-management surfaces; admin role required.
    AdminOnly,
    /// A role's landing area; only that role may enter.
    RoleDashboard(Role),
    /// Identity-scoped resource (profile, login history): owner or admin.
    SelfOrAdmin { owner_id: Uuid },
    /// Anything else: being authenticated is sufficient.
    Unclassified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    InsufficientRole,
    WrongDashboard,
    NotOwner,
}

/// Static path-prefix tables mapping URL space to resource classes.
/// Mirrors the resource layout of the NEXAS web layer; constructed at startup
/// and never mutated (the per-role dashboard prefixes come from the same
/// table the dashboard router uses).
#[derive(Clone, Debug)]
pub struct RouteTable {
    public_prefixes: Vec<String>,
    admin_only_prefixes: Vec<String>,
    dashboard_prefixes: Vec<(Role, String)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            public_prefixes: [
                "/accounts/login/",
                "/accounts/logout/",
                "/accounts/password-reset/",
                "/accounts/password-reset-done/",
                "/static/",
                "/media/",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            admin_only_prefixes: [
                "/accounts/users/",
                "/accounts/user/create/",
                "/accounts/user/update/",
                "/accounts/user/delete/",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            dashboard_prefixes: [
                (Role::Admin, "/dashboard/admin/"),
                (Role::Volunteer, "/dashboard/volunteer/"),
                (Role::Campaign, "/dashboard/campaign/"),
                (Role::Donation, "/dashboard/donation/"),
            ]
            .into_iter()
            .map(|(role, prefix)| (role, prefix.to_string()))
            .collect(),
        }
    }
}

impl RouteTable {
    /// Classify a request path by longest-wins prefix tables. Public wins
    /// over everything; unmatched paths are `Unclassified`.
    #[must_use]
    pub fn classify(&self, path: &str) -> Resource {
        if self
            .public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            return Resource::Public;
        }
        if self
            .admin_only_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            return Resource::AdminOnly;
        }
        for (role, prefix) in &self.dashboard_prefixes {
            if path.starts_with(prefix) {
                return Resource::RoleDashboard(*role);
            }
        }
        Resource::Unclassified
    }
}

/// Evaluate the access rules for an (optional) identity against a classified
/// resource. Pure; every check is an O(1) comparison.
#[must_use]
pub fn authorize(identity: Option<&Identity>, resource: &Resource) -> Decision {
    if matches!(resource, Resource::Public) {
        return Decision::Allow;
    }
    let Some(identity) = identity else {
        return Decision::Deny(DenyReason::NotAuthenticated);
    };
    match resource {
        Resource::Public => Decision::Allow,
        Resource::AdminOnly => {
            if identity.role == Role::Admin {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::InsufficientRole)
            }
        }
        Resource::RoleDashboard(role) => {
            if identity.role == *role {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::WrongDashboard)
            }
        }
        Resource::SelfOrAdmin { owner_id } => {
            if identity.id == *owner_id || identity.role == Role::Admin {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotOwner)
            }
        }
        Resource::Unclassified => Decision::Allow,
    }
}

/// Fine-grained capability check: pure lookup against the static role table.
#[must_use]
pub fn has_permission(identity: &Identity, permission: Permission) -> bool {
    identity.role.has_permission(permission)
}
