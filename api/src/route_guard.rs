//! Route guard for admin pages.
//!
//! Unlike the access gate, the route guard never answers with an error: a
//! denied check becomes a redirect to a safe page, recorded as a
//! `SECURITY_VIOLATION`. A check for a credential/path pair that is already
//! in flight returns [`GuardOutcome::Pending`] instead of running again.

use abuse_guard::{AbuseGuard, BucketFamily};
use audit::{AuditDetails, AuditEventType, AuditLevel, AuditLogger};
use authz::{can_access_page, Role, RoleStore};
use identity::IdentityVerifier;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::models::GuardResponse;

/// Where unauthenticated visitors are sent
pub const LOGIN_PAGE: &str = "/login";
/// Where authenticated visitors without access are sent
pub const FALLBACK_PAGE: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow { email: String, role: Role },
    Redirect { to: &'static str, reason: &'static str },
    /// The same check is already running
    Pending,
}

impl From<GuardOutcome> for GuardResponse {
    fn from(outcome: GuardOutcome) -> Self {
        match outcome {
            GuardOutcome::Allow { role, .. } => GuardResponse {
                outcome: "allow".to_string(),
                redirect_to: None,
                reason: None,
                role: Some(role.as_str().to_string()),
            },
            GuardOutcome::Redirect { to, reason } => GuardResponse {
                outcome: "redirect".to_string(),
                redirect_to: Some(to.to_string()),
                reason: Some(reason.to_string()),
                role: None,
            },
            GuardOutcome::Pending => GuardResponse {
                outcome: "pending".to_string(),
                redirect_to: None,
                reason: None,
                role: None,
            },
        }
    }
}

pub struct RouteGuard {
    verifier: Arc<dyn IdentityVerifier>,
    roles: Arc<dyn RoleStore>,
    guard: Arc<AbuseGuard>,
    audit: Arc<AuditLogger>,
    in_flight: Mutex<HashSet<(String, String)>>,
}

/// Removes the in-flight marker when the check finishes or is dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<(String, String)>>,
    key: (String, String),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

impl RouteGuard {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        roles: Arc<dyn RoleStore>,
        guard: Arc<AbuseGuard>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            verifier,
            roles,
            guard,
            audit,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Decide whether the holder of `token` may open `path`.
    pub async fn check(&self, token: Option<&str>, path: &str, ip: Option<String>) -> GuardOutcome {
        let key = (token.unwrap_or_default().to_string(), path.to_string());
        let _marker = {
            let Ok(mut set) = self.in_flight.lock() else {
                return GuardOutcome::Pending;
            };
            if !set.insert(key.clone()) {
                debug!("ROUTE GUARD: check for {} already in flight", path);
                return GuardOutcome::Pending;
            }
            InFlight {
                set: &self.in_flight,
                key,
            }
        };

        match self.evaluate(token, path).await {
            Ok((email, role)) => GuardOutcome::Allow { email, role },
            Err((reason, email, role)) => {
                let to = match reason {
                    "NO_TOKEN" | "INVALID_TOKEN" => LOGIN_PAGE,
                    _ => FALLBACK_PAGE,
                };
                warn!("ROUTE GUARD: {} denied for {:?}: {}", path, email, reason);

                let mut details = AuditDetails::new()
                    .with_level(AuditLevel::Warning)
                    .with_ip(ip)
                    .with_resource(path)
                    .with_action("route_guard")
                    .with_metadata(json!({ "reason": reason, "redirectTo": to }));
                if let Some(email) = email {
                    details = details.with_actor(email, role.map(|r| r.as_str()));
                }
                self.audit.log(AuditEventType::SecurityViolation, details).await;

                GuardOutcome::Redirect { to, reason }
            }
        }
    }

    async fn evaluate(
        &self,
        token: Option<&str>,
        path: &str,
    ) -> Result<(String, Role), (&'static str, Option<String>, Option<Role>)> {
        let token = token.ok_or(("NO_TOKEN", None, None))?;

        let email = match self.verifier.verify(token).await {
            Ok(identity) => identity.email,
            Err(e) if e.is_credential_error() => return Err(("INVALID_TOKEN", None, None)),
            Err(_) => return Err(("AUTH_SERVICE_ERROR", None, None)),
        };

        if self.guard.is_blocked(&email).await {
            return Err(("TEMPORARILY_BLOCKED", Some(email), None));
        }
        let decision = self.guard.check(BucketFamily::General, &email).await;
        if !decision.allowed {
            return Err(("RATE_LIMIT_EXCEEDED", Some(email), None));
        }

        let role = match self.roles.get_role(&email).await {
            Ok(role) => role,
            Err(_) => return Err(("SYSTEM_ERROR", Some(email), None)),
        };
        match role {
            Some(role) if can_access_page(Some(role), path) => Ok((email, role)),
            _ => Err(("INSUFFICIENT_PERMISSIONS", Some(email), role)),
        }
    }
}
