use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuditError;

/// Kinds of events recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    AdminAdded,
    AdminRemoved,
    AdminRoleChanged,
    BulkOperation,
    SecurityViolation,
    UnauthorizedAccess,
    PermissionDenied,
    RateLimitExceeded,
    LoginSuccess,
    LoginFailure,
    AuditLogViewed,
    RaffleCreated,
    RaffleDrawn,
    RaffleWinnerChanged,
    RaffleEnded,
    RaffleAnnounced,
    RaffleDeleted,
    ParticipantEnrolled,
    SystemError,
    AuthServiceError,
}

impl AuditEventType {
    pub const ALL: [AuditEventType; 20] = [
        AuditEventType::AdminAdded,
        AuditEventType::AdminRemoved,
        AuditEventType::AdminRoleChanged,
        AuditEventType::BulkOperation,
        AuditEventType::SecurityViolation,
        AuditEventType::UnauthorizedAccess,
        AuditEventType::PermissionDenied,
        AuditEventType::RateLimitExceeded,
        AuditEventType::LoginSuccess,
        AuditEventType::LoginFailure,
        AuditEventType::AuditLogViewed,
        AuditEventType::RaffleCreated,
        AuditEventType::RaffleDrawn,
        AuditEventType::RaffleWinnerChanged,
        AuditEventType::RaffleEnded,
        AuditEventType::RaffleAnnounced,
        AuditEventType::RaffleDeleted,
        AuditEventType::ParticipantEnrolled,
        AuditEventType::SystemError,
        AuditEventType::AuthServiceError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::AdminAdded => "ADMIN_ADDED",
            AuditEventType::AdminRemoved => "ADMIN_REMOVED",
            AuditEventType::AdminRoleChanged => "ADMIN_ROLE_CHANGED",
            AuditEventType::BulkOperation => "BULK_OPERATION",
            AuditEventType::SecurityViolation => "SECURITY_VIOLATION",
            AuditEventType::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            AuditEventType::PermissionDenied => "PERMISSION_DENIED",
            AuditEventType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AuditEventType::LoginSuccess => "LOGIN_SUCCESS",
            AuditEventType::LoginFailure => "LOGIN_FAILURE",
            AuditEventType::AuditLogViewed => "AUDIT_LOG_VIEWED",
            AuditEventType::RaffleCreated => "RAFFLE_CREATED",
            AuditEventType::RaffleDrawn => "RAFFLE_DRAWN",
            AuditEventType::RaffleWinnerChanged => "RAFFLE_WINNER_CHANGED",
            AuditEventType::RaffleEnded => "RAFFLE_ENDED",
            AuditEventType::RaffleAnnounced => "RAFFLE_ANNOUNCED",
            AuditEventType::RaffleDeleted => "RAFFLE_DELETED",
            AuditEventType::ParticipantEnrolled => "PARTICIPANT_ENROLLED",
            AuditEventType::SystemError => "SYSTEM_ERROR",
            AuditEventType::AuthServiceError => "AUTH_SERVICE_ERROR",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditEventType::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| AuditError::UnknownEventType(s.to_string()))
    }
}

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
            AuditLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditLevel {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AuditLevel::Info),
            "warning" => Ok(AuditLevel::Warning),
            "error" => Ok(AuditLevel::Error),
            "critical" => Ok(AuditLevel::Critical),
            other => Err(AuditError::UnknownLevel(other.to_string())),
        }
    }
}

/// Caller-supplied context for an audit event.
///
/// Build with the `with_*` helpers:
///
/// ```rust
/// use audit::{AuditDetails, AuditLevel};
///
/// let details = AuditDetails::new()
///     .with_level(AuditLevel::Warning)
///     .with_actor("a@x.com", Some("admin"))
///     .with_target_email("b@x.com", "admin")
///     .with_action("remove_admin");
/// assert_eq!(details.level, AuditLevel::Warning);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    pub level: AuditLevel,
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub actor_ip: Option<String>,
    pub target_email: Option<String>,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    /// Browser session identifier, only honoured with functional consent
    pub session_id: Option<String>,
    /// Whether the user opted into functional storage
    pub functional_consent: bool,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub error: Option<String>,
    pub stack_trace: Option<String>,
}

impl AuditDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_actor(mut self, email: impl Into<String>, role: Option<&str>) -> Self {
        self.actor_email = Some(email.into());
        self.actor_role = role.map(str::to_string);
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.actor_ip = ip;
        self
    }

    pub fn with_target_email(
        mut self,
        email: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        self.target_email = Some(email.into());
        self.target_type = Some(target_type.into());
        self
    }

    pub fn with_target_id(mut self, id: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self.target_type = Some(target_type.into());
        self
    }

    pub fn with_session(mut self, session_id: Option<String>, functional_consent: bool) -> Self {
        self.session_id = session_id;
        self.functional_consent = functional_consent;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_change(
        mut self,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A single recorded audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// ULID: millisecond timestamp followed by random bits
    pub id: String,
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub actor_ip: Option<String>,
    pub target_email: Option<String>,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub session_id: String,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    /// 0 to 10, derived from the event type and context
    pub risk_score: u8,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Filters for reading the audit trail, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub event_type: Option<AuditEventType>,
    pub actor_email: Option<String>,
    pub level: Option<AuditLevel>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// 1-based page number, used when no cursor is given
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Id of the last entry of the previous page
    pub last_doc_id: Option<String>,
}

impl AuditQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Requested page size, defaulted and capped at [`Self::MAX_PAGE_SIZE`].
    pub fn effective_page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .clamp(1, Self::MAX_PAGE_SIZE)
    }

    /// Rows to skip for page-number pagination. Zero when a cursor is used.
    pub fn offset(&self) -> u32 {
        if self.last_doc_id.is_some() {
            return 0;
        }
        self.page
            .unwrap_or(1)
            .saturating_sub(1)
            .saturating_mul(self.effective_page_size())
    }
}

/// One page of audit entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub logs: Vec<AuditEntry>,
    pub page_size: u32,
    pub has_more: bool,
    /// Cursor for the next page
    pub last_doc_id: Option<String>,
}
