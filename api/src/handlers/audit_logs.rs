use audit::{AuditEventType, AuditLevel, AuditQuery};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde_json::json;
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    middleware_hooks::GrantedAccess,
    models::{AuditLogParams, AuditLogsResponse},
    AppState,
};

impl TryFrom<AuditLogParams> for AuditQuery {
    type Error = ApiError;

    fn try_from(params: AuditLogParams) -> Result<Self, Self::Error> {
        let event_type = params
            .event_type
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<AuditEventType>())
            .transpose()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        let level = params
            .level
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<AuditLevel>())
            .transpose()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        Ok(AuditQuery {
            event_type,
            actor_email: params.actor_email.filter(|s| !s.is_empty()),
            level,
            start_date: params.start_date,
            end_date: params.end_date,
            page: params.page,
            page_size: params.page_size,
            last_doc_id: params.last_doc_id.filter(|s| !s.is_empty()),
        })
    }
}

/// Read the audit trail, newest first
#[utoipa::path(
    get,
    path = "/api/v1/admin/audit-logs",
    params(AuditLogParams),
    responses(
        (status = 200, description = "One page of audit entries", body = AuditLogsResponse),
        (status = 400, description = "Unknown filter value or cursor", body = crate::error::ApiErrorResponse),
        (status = 403, description = "Not an admin", body = crate::error::ApiErrorResponse)
    ),
    tag = "audit"
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    Query(params): Query<AuditLogParams>,
) -> ApiResult<Json<AuditLogsResponse>> {
    let query = AuditQuery::try_from(params)?;
    debug!("Audit log query by {}: {:?}", access.email, query);

    let page = state.db.audit_logs().query(&query).await?;

    state
        .audit
        .log(
            AuditEventType::AuditLogViewed,
            access
                .audit_details()
                .with_action("view_audit_logs")
                .with_resource("/admin/audit-logs")
                .with_metadata(json!({
                    "eventType": query.event_type,
                    "actorEmail": query.actor_email,
                    "level": query.level,
                    "returned": page.logs.len(),
                })),
        )
        .await;

    Ok(Json(page.into()))
}
