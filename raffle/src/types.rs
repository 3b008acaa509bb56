use audit::AuditDetails;
use authz::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{RaffleError, Result};

/// Who is performing a raffle operation, for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub email: String,
    pub role: Option<Role>,
    pub ip: Option<String>,
}

impl Actor {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    pub(crate) fn audit_details(&self) -> AuditDetails {
        AuditDetails::new()
            .with_actor(self.email.clone(), self.role.map(|role| role.as_str()))
            .with_ip(self.ip.clone())
    }
}

/// Input for creating a raffle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewRaffle {
    pub event_id: String,
    #[serde(default)]
    pub event_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prize: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewRaffle {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.event_id.trim().is_empty() {
            return Err(RaffleError::Validation("eventId is required".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(RaffleError::Validation("title is required".to_string()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(RaffleError::Validation(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRaffle {
    pub id: String,
    /// Number of participant records back-filled from existing posts
    pub participants: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletedRaffle {
    pub id: String,
    pub participants_removed: u64,
    pub announcement_removed: bool,
}

/// Per-raffle participant figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaffleScopeStats {
    pub raffle_id: String,
    pub participant_count: usize,
    pub unique_participant_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaffleStats {
    pub total_raffles: usize,
    pub active_raffles: usize,
    pub completed_raffles: usize,
    pub announced_raffles: usize,
    pub total_participants: usize,
    pub unique_participants: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raffle: Option<RaffleScopeStats>,
}
