//! Core authorization types: roles, the static page grant table and the
//! access requirements attached to protected routes.
//!
//! # Grant table
//!
//! The grant table is compiled into the binary. Changing which pages an
//! event manager may open means editing [`EVENT_MANAGER_PAGES`] and
//! redeploying; there is no runtime mutation path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthzError;

/// Pages an event manager is allowed to open. Admins are implicitly
/// granted every page.
pub const EVENT_MANAGER_PAGES: &[&str] = &[
    "/admin",
    "/admin/events",
    "/admin/posts",
    "/admin/raffles",
    "/admin/quizzes",
    "/admin/announcements",
    "/admin/gallery",
];

/// A role held by an identity.
///
/// Roles are stored on the identity's role record in the `admins`
/// collection. Only two roles exist; an identity without a record has no
/// role at all, which is modelled as `Option<Role>::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access to every resource.
    Admin,
    /// Restricted to the pages listed in [`EVENT_MANAGER_PAGES`].
    EventManager,
}

impl Role {
    /// Wire name of the role as stored in role records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::EventManager => "event_manager",
        }
    }

    /// Resolves the role carried by an existing role record.
    ///
    /// Records written before roles were introduced have no `role` field at
    /// all; those identities were admins, so a missing value resolves to
    /// [`Role::Admin`]. This backward-compatibility rule is intentional and
    /// must be kept for as long as such records may exist.
    ///
    /// An unrecognised value resolves to `None` so the identity is treated
    /// as having no role.
    pub fn from_record(raw: Option<&str>) -> Option<Role> {
        match raw {
            None => Some(Role::Admin),
            Some(value) => value.parse().ok(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "event_manager" => Ok(Role::EventManager),
            other => Err(AuthzError::InvalidRole(other.to_string())),
        }
    }
}

/// What a protected operation demands from the caller.
///
/// `role` is the minimum role (see [`crate::has_permission`]); `page`, when
/// set, is additionally checked against the grant table so an event manager
/// only reaches the operations behind pages granted to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequirement {
    pub role: Role,
    pub page: Option<&'static str>,
}

impl AccessRequirement {
    /// Requires the admin role.
    pub const fn admin() -> Self {
        Self {
            role: Role::Admin,
            page: None,
        }
    }

    /// Requires at least the event manager role and access to `page`.
    pub const fn event_manager(page: &'static str) -> Self {
        Self {
            role: Role::EventManager,
            page: Some(page),
        }
    }

    /// Evaluates the requirement against a resolved role.
    pub fn permits(&self, role: Option<Role>) -> bool {
        if !crate::has_permission(role, self.role) {
            return false;
        }
        match self.page {
            Some(page) => crate::can_access_page(role, page),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_wire_name() {
        for role in [Role::Admin, Role::EventManager] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let err = "moderator".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid role: moderator");
    }

    #[test]
    fn test_missing_role_field_falls_back_to_admin() {
        assert_eq!(Role::from_record(None), Some(Role::Admin));
        assert_eq!(
            Role::from_record(Some("event_manager")),
            Some(Role::EventManager)
        );
        assert_eq!(Role::from_record(Some("guest")), None);
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::EventManager).unwrap();
        assert_eq!(json, "\"event_manager\"");
    }

    #[test]
    fn test_requirement_checks_page_grant() {
        let raffles = AccessRequirement::event_manager("/admin/raffles");
        assert!(raffles.permits(Some(Role::EventManager)));
        assert!(raffles.permits(Some(Role::Admin)));
        assert!(!raffles.permits(None));

        let settings = AccessRequirement::event_manager("/admin/settings");
        assert!(!settings.permits(Some(Role::EventManager)));
        assert!(settings.permits(Some(Role::Admin)));

        assert!(!AccessRequirement::admin().permits(Some(Role::EventManager)));
    }
}
