//! Risk scoring and tag derivation for audit entries.

use crate::types::{AuditDetails, AuditEventType, AuditLevel};

pub const MAX_RISK: u8 = 10;

/// Base score of an event type before contextual adjustments.
pub fn base_score(event_type: AuditEventType) -> i32 {
    match event_type {
        AuditEventType::SecurityViolation => 10,
        AuditEventType::AdminRemoved => 9,
        AuditEventType::AdminAdded | AuditEventType::AdminRoleChanged => 8,
        AuditEventType::BulkOperation => 7,
        AuditEventType::UnauthorizedAccess | AuditEventType::PermissionDenied => 5,
        AuditEventType::RateLimitExceeded
        | AuditEventType::RaffleWinnerChanged
        | AuditEventType::RaffleDeleted => 4,
        AuditEventType::LoginFailure
        | AuditEventType::SystemError
        | AuditEventType::AuthServiceError => 3,
        _ => 1,
    }
}

/// Scores an event on the 0..=10 scale.
///
/// Adds 2 when the actor is an admin, 3 when the target is an admin, 2 for
/// error level and 5 for critical level, then clamps.
pub fn risk_score(event_type: AuditEventType, details: &AuditDetails) -> u8 {
    let mut score = base_score(event_type);

    if details.actor_role.as_deref() == Some("admin") {
        score += 2;
    }
    if details.target_type.as_deref() == Some("admin") {
        score += 3;
    }
    score += match details.level {
        AuditLevel::Error => 2,
        AuditLevel::Critical => 5,
        AuditLevel::Info | AuditLevel::Warning => 0,
    };

    score.clamp(0, MAX_RISK as i32) as u8
}

/// Tags used to search the audit trail.
pub fn derive_tags(event_type: AuditEventType, details: &AuditDetails) -> Vec<String> {
    let mut tags = vec![event_type.as_str().to_string()];
    if let Some(role) = &details.actor_role {
        tags.push(format!("actor:{}", role));
    }
    if let Some(target_type) = &details.target_type {
        tags.push(format!("target:{}", target_type));
    }
    tags.push(format!("level:{}", details.level));
    if let Some(resource) = &details.resource {
        tags.push(format!("resource:{}", resource));
    }
    tags
}
