//! Role to landing-dashboard mapping.

use crate::account::Role;

/// Landing path for a role. Total over [`Role`]; unknown stored role values
/// are already folded to `Volunteer` by [`Role::parse_lossy`], which keeps
/// the volunteer-path fallback policy in one place.
#[must_use]
pub fn dashboard_for(role: Role) -> &'static str {
    match role {
        Role::Admin => "/dashboard/admin/",
        Role::Volunteer => "/dashboard/volunteer/",
        Role::Campaign => "/dashboard/campaign/",
        Role::Donation => "/dashboard/donation/",
    }
}
