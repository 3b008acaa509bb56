//! Role-based authorization for the club admin backend.
//!
//! This crate provides the pieces every admin operation is gated on:
//!
//! - [`Role`] and the static event manager grant table ([`EVENT_MANAGER_PAGES`])
//! - the permission policy: [`has_permission`] and [`can_access_page`]
//! - the [`RoleStore`] seam used to look up the role record of an identity
//!
//! # Authorization Flow
//!
//! 1. **Request arrives** at the API layer
//! 2. **Authentication** verifies the bearer credential and yields an identity
//! 3. **Role resolution** reads the identity's role record through a [`RoleStore`]
//! 4. **Policy check** evaluates the resolved role against the route's
//!    [`AccessRequirement`]
//! 5. **Decision**: the wrapped handler runs, or the request is denied
//!
//! The policy functions are pure and total: every `(role, input)` pair maps
//! to a boolean, and an identity without a role record is denied everywhere.

pub mod error;
pub mod types;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

pub use error::{AuthzError, Result};
pub use types::{AccessRequirement, Role, EVENT_MANAGER_PAGES};

/// Returns whether `role` satisfies a requirement of `required`.
///
/// Admins satisfy every requirement, event managers satisfy only the event
/// manager requirement, and an identity without a role satisfies nothing.
pub fn has_permission(role: Option<Role>, required: Role) -> bool {
    match (role, required) {
        (Some(Role::Admin), _) => true,
        (Some(Role::EventManager), Role::EventManager) => true,
        _ => false,
    }
}

/// Returns whether `role` may open the page at `path`.
///
/// Admins may open any page. Event managers may open exactly the pages in
/// [`EVENT_MANAGER_PAGES`].
pub fn can_access_page(role: Option<Role>, path: &str) -> bool {
    match role {
        Some(Role::Admin) => true,
        Some(Role::EventManager) => EVENT_MANAGER_PAGES.contains(&path),
        None => false,
    }
}

/// Read access to per-identity role records.
///
/// Every call goes to the backing store; implementations must not cache, so
/// a role change or removal takes effect on the very next request. The
/// server-side gate and the route guard both resolve roles through this
/// trait, each with the credentials of its own store handle.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Returns the role of `identity`, or `None` when it has no role record.
    async fn get_role(&self, identity: &str) -> Result<Option<Role>>;
}

/// A role store held entirely in memory.
///
/// Useful for tests and for wiring the API without a database.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    roles: RwLock<HashMap<String, Option<String>>>,
}

impl InMemoryRoleStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the role record of `identity`.
    pub async fn set_role(&self, identity: impl Into<String>, role: Role) {
        self.roles
            .write()
            .await
            .insert(identity.into(), Some(role.as_str().to_string()));
    }

    /// Inserts a record without a role field, as written by older releases.
    pub async fn set_legacy_record(&self, identity: impl Into<String>) {
        self.roles.write().await.insert(identity.into(), None);
    }

    /// Removes the role record of `identity`.
    pub async fn remove(&self, identity: &str) {
        self.roles.write().await.remove(identity);
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role(&self, identity: &str) -> Result<Option<Role>> {
        let roles = self.roles.read().await;
        let role = roles
            .get(identity)
            .and_then(|raw| Role::from_record(raw.as_deref()));
        debug!("Resolved role for {}: {:?}", identity, role);
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(Role::Admin), Role::Admin, true)]
    #[case(Some(Role::Admin), Role::EventManager, true)]
    #[case(Some(Role::EventManager), Role::EventManager, true)]
    #[case(Some(Role::EventManager), Role::Admin, false)]
    #[case(None, Role::EventManager, false)]
    #[case(None, Role::Admin, false)]
    fn test_has_permission(
        #[case] role: Option<Role>,
        #[case] required: Role,
        #[case] expected: bool,
    ) {
        assert_eq!(has_permission(role, required), expected);
    }

    #[rstest]
    #[case("/admin")]
    #[case("/admin/raffles")]
    #[case("/admin/settings")]
    #[case("/admin/admins")]
    #[case("/anything/else")]
    fn test_admin_can_access_every_page(#[case] path: &str) {
        assert!(can_access_page(Some(Role::Admin), path));
    }

    #[test]
    fn test_event_manager_limited_to_grant_table() {
        for page in EVENT_MANAGER_PAGES {
            assert!(can_access_page(Some(Role::EventManager), page));
        }
        assert!(!can_access_page(Some(Role::EventManager), "/admin/admins"));
        assert!(!can_access_page(Some(Role::EventManager), "/admin/audit-logs"));
        assert!(!can_access_page(Some(Role::EventManager), "/admin/raffles/extra"));
    }

    #[test]
    fn test_no_role_denied_everywhere() {
        for page in EVENT_MANAGER_PAGES {
            assert!(!can_access_page(None, page));
        }
        assert!(!can_access_page(None, "/"));
    }

    #[tokio::test]
    async fn test_in_memory_store_lookup() {
        let store = InMemoryRoleStore::new();
        store.set_role("a@x.com", Role::Admin).await;
        store.set_role("m@x.com", Role::EventManager).await;
        store.set_legacy_record("old@x.com").await;

        assert_eq!(store.get_role("a@x.com").await.unwrap(), Some(Role::Admin));
        assert_eq!(
            store.get_role("m@x.com").await.unwrap(),
            Some(Role::EventManager)
        );
        assert_eq!(store.get_role("old@x.com").await.unwrap(), Some(Role::Admin));
        assert_eq!(store.get_role("nobody@x.com").await.unwrap(), None);

        store.remove("a@x.com").await;
        assert_eq!(store.get_role("a@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_identity_without_record_cannot_open_any_page() {
        let store = InMemoryRoleStore::new();
        let role = store.get_role("stranger@x.com").await.unwrap();
        assert!(role.is_none());
        for page in EVENT_MANAGER_PAGES.iter().chain(["/admin/admins"].iter()) {
            assert!(!can_access_page(role, page));
        }
    }
}
