use audit::{AuditEntry, AuditPage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Request to add a role record
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddAdminRequest {
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Request to change the role of an identity
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAdminRequest {
    pub admin_id: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteAdminParams {
    /// Email of the role record to remove
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminListResponse {
    pub admins: Vec<database::AdminRecord>,
    pub total: usize,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

/// Audit log filters as they arrive on the query string
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AuditLogParams {
    pub page: Option<u32>,
    /// Capped at 100
    pub page_size: Option<u32>,
    pub event_type: Option<String>,
    pub actor_email: Option<String>,
    pub level: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub last_doc_id: Option<String>,
}

/// One page of the audit trail
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogsResponse {
    #[schema(value_type = Vec<Object>)]
    pub logs: Vec<AuditEntry>,
    pub page_size: u32,
    pub has_more: bool,
    pub last_doc_id: Option<String>,
}

impl From<AuditPage> for AuditLogsResponse {
    fn from(page: AuditPage) -> Self {
        Self {
            logs: page.logs,
            page_size: page.page_size,
            has_more: page.has_more,
            last_doc_id: page.last_doc_id,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RaffleListParams {
    pub event_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RaffleStatsParams {
    pub raffle_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RaffleListResponse {
    pub raffles: Vec<database::Raffle>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ParticipantListResponse {
    pub participants: Vec<database::RaffleParticipant>,
    pub total: usize,
}

/// Request to replace a raffle winner
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeWinnerRequest {
    /// Participant record id or user id
    pub winner_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollPostRequest {
    pub post_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollPostResponse {
    pub post_id: String,
    pub raffle_ids: Vec<String>,
}

/// Login verification request
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub email: String,
    /// `admin`, `event_manager`, or null without a role record
    pub role: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Route guard request
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct GuardRequest {
    pub path: String,
}

/// Route guard verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuardResponse {
    /// `allow`, `redirect` or `pending`
    pub outcome: String,
    pub redirect_to: Option<String>,
    pub reason: Option<String>,
    pub role: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub database: DatabaseHealth,
    pub audit: AuditHealth,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditHealth {
    pub queued: usize,
    pub flushing: bool,
}
