//! Account identity, roles, and the static role/permission table.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role assigned to every account. Determines the landing dashboard and the
/// fixed permission set; it never changes what the account *is*, only what it
/// may touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Volunteer,
    Campaign,
    Donation,
}

impl Role {
    /// Storage representation, matching the values persisted in the
    /// `accounts` table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Volunteer => "volunteer",
            Self::Campaign => "campaign",
            Self::Donation => "donation",
        }
    }

    /// Parse a stored role value. Unknown values fall back to `Volunteer`,
    /// the least-privileged role; this is the documented fallback policy, not
    /// an error.
    #[must_use]
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "admin" => Self::Admin,
            "campaign" => Self::Campaign,
            "donation" => Self::Donation,
            _ => Self::Volunteer,
        }
    }

    /// Fixed permission set for this role. Pure lookup against a static
    /// table; no storage access.
    #[must_use]
    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Admin => &[
                Permission::ManageUsers,
                Permission::ManageCampaigns,
                Permission::ManageDonations,
                Permission::ManageVolunteers,
                Permission::ViewAllDashboards,
            ],
            Self::Campaign => &[
                Permission::ManageCampaigns,
                Permission::ViewCampaignReports,
                Permission::CreateCampaigns,
                Permission::EditCampaigns,
            ],
            Self::Donation => &[
                Permission::ManageDonations,
                Permission::ViewDonationReports,
                Permission::ProcessDonations,
                Permission::GenerateReceipts,
            ],
            Self::Volunteer => &[
                Permission::ViewVolunteerDashboard,
                Permission::UpdateProfile,
                Permission::ViewAssignedTasks,
            ],
        }
    }

    #[must_use]
    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

/// Named capabilities, enum-keyed so a typo fails to compile instead of
/// silently denying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageUsers,
    ManageCampaigns,
    ManageDonations,
    ManageVolunteers,
    ViewAllDashboards,
    ViewCampaignReports,
    CreateCampaigns,
    EditCampaigns,
    ViewDonationReports,
    ProcessDonations,
    GenerateReceipts,
    ViewVolunteerDashboard,
    UpdateProfile,
    ViewAssignedTasks,
}

/// Persisted account record. The password is stored only as a PHC hash;
/// raw passwords never reach this type.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub department: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether a lockout set by repeated failures is still in force.
    #[must_use]
    pub fn locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Authenticated account bound to the current request/session. This is what
/// the authorization engine and collaborators see; it carries no credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Fields supplied by the user-creation form. Profile fields are opaque to
/// this core; only the email is validated here.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub password: SecretString,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub department: Option<String>,
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .is_ok_and(|regex| regex.is_match(email_normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn role_round_trips_storage_values() {
        for role in [Role::Admin, Role::Volunteer, Role::Campaign, Role::Donation] {
            assert_eq!(Role::parse_lossy(role.as_str()), role);
        }
    }

    #[test]
    fn unknown_role_falls_back_to_volunteer() {
        assert_eq!(Role::parse_lossy("superuser"), Role::Volunteer);
        assert_eq!(Role::parse_lossy(""), Role::Volunteer);
    }

    #[test]
    fn admin_holds_management_permissions() {
        assert!(Role::Admin.has_permission(Permission::ManageUsers));
        assert!(Role::Admin.has_permission(Permission::ViewAllDashboards));
        assert!(!Role::Admin.has_permission(Permission::ViewAssignedTasks));
    }

    #[test]
    fn volunteer_cannot_manage() {
        assert!(!Role::Volunteer.has_permission(Permission::ManageUsers));
        assert!(!Role::Volunteer.has_permission(Permission::ManageDonations));
        assert!(Role::Volunteer.has_permission(Permission::UpdateProfile));
    }

    #[test]
    fn managers_scope_to_their_domain() {
        assert!(Role::Campaign.has_permission(Permission::ManageCampaigns));
        assert!(!Role::Campaign.has_permission(Permission::ManageDonations));
        assert!(Role::Donation.has_permission(Permission::GenerateReceipts));
        assert!(!Role::Donation.has_permission(Permission::ManageCampaigns));
    }

    #[test]
    fn lockout_respects_expiry() {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            password_hash: String::new(),
            role: Role::Volunteer,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone_number: None,
            department: None,
            is_active: true,
            email_verified: false,
            failed_login_attempts: 5,
            locked_until: Some(now + chrono::Duration::minutes(30)),
            last_login_ip: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(account.locked_at(now));
        assert!(!account.locked_at(now + chrono::Duration::minutes(31)));
    }
}
