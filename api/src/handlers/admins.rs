//! Role record management. Admin only.
//!
//! Besides the access gate, every mutation refuses to act on the caller's
//! own record.

use audit::{AuditEventType, AuditLevel};
use authz::Role;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Extension, Json,
};
use database::{AdminRecord, DatabaseError};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    middleware_hooks::GrantedAccess,
    models::{AddAdminRequest, AdminListResponse, DeleteAdminParams, SuccessResponse, UpdateAdminRequest},
    AppState,
};

fn normalize_email(raw: Option<String>) -> Option<String> {
    raw.map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
}

fn parse_role(raw: &str) -> ApiResult<Role> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid role: {}", raw)))
}

/// Reject and audit an operation on the caller's own record.
async fn forbid_self(
    state: &AppState,
    access: &GrantedAccess,
    target: &str,
    action: &str,
    code: &'static str,
) -> ApiResult<()> {
    if !access.email.eq_ignore_ascii_case(target) {
        return Ok(());
    }
    warn!("{} attempted {} on their own record", access.email, action);
    state
        .audit
        .log(
            AuditEventType::SecurityViolation,
            access
                .audit_details()
                .with_level(AuditLevel::Warning)
                .with_target_email(target, access.role.as_str())
                .with_action(action)
                .with_resource("/admin/admins")
                .with_error(code),
        )
        .await;
    Err(ApiError::Forbidden {
        code,
        message: format!("You cannot {} your own account", action.replace('_', " ")),
    })
}

/// List role records
#[utoipa::path(
    get,
    path = "/api/v1/admin/admins",
    responses(
        (status = 200, description = "Role records", body = AdminListResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorResponse),
        (status = 403, description = "Not an admin", body = crate::error::ApiErrorResponse),
        (status = 429, description = "Rate limited", body = crate::error::ApiErrorResponse)
    ),
    tag = "admins"
)]
pub async fn list_admins(State(state): State<AppState>) -> ApiResult<Json<AdminListResponse>> {
    let admins = state.db.admins().list().await?;
    Ok(Json(AdminListResponse {
        total: admins.len(),
        admins,
    }))
}

/// Add a role record
#[utoipa::path(
    post,
    path = "/api/v1/admin/admins",
    request_body = AddAdminRequest,
    responses(
        (status = 200, description = "Role record created", body = AdminRecord),
        (status = 400, description = "Missing email or role", body = crate::error::ApiErrorResponse),
        (status = 403, description = "Not an admin, or own account", body = crate::error::ApiErrorResponse),
        (status = 409, description = "Identity already has a role", body = crate::error::ApiErrorResponse)
    ),
    tag = "admins"
)]
pub async fn add_admin(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    body: Result<Json<AddAdminRequest>, JsonRejection>,
) -> ApiResult<Json<AdminRecord>> {
    let Json(body) = body?;
    let (Some(email), Some(raw_role)) = (normalize_email(body.email), body.role) else {
        return Err(ApiError::Validation("email and role are required".to_string()));
    };
    let role = parse_role(&raw_role)?;

    forbid_self(&state, &access, &email, "add", "SELF_ADD_FORBIDDEN").await?;

    let record = match state
        .db
        .admins()
        .insert(&email, role, Some(access.email.as_str()))
        .await
    {
        Ok(record) => record,
        Err(DatabaseError::Duplicate(_)) => {
            return Err(ApiError::Conflict {
                code: "ADMIN_EXISTS",
                message: format!("{} already has a role", email),
            })
        }
        Err(e) => return Err(e.into()),
    };

    info!("{} added {} as {}", access.email, email, role);
    state
        .audit
        .log(
            AuditEventType::AdminAdded,
            access
                .audit_details()
                .with_target_email(email.clone(), role.as_str())
                .with_action("add_admin")
                .with_resource("/admin/admins")
                .with_change(None, Some(json!(role.as_str()))),
        )
        .await;

    Ok(Json(record))
}

/// Change the role of another identity
#[utoipa::path(
    put,
    path = "/api/v1/admin/admins",
    request_body = UpdateAdminRequest,
    responses(
        (status = 200, description = "Role changed", body = SuccessResponse),
        (status = 400, description = "Missing adminId or role", body = crate::error::ApiErrorResponse),
        (status = 403, description = "Not an admin, or own account", body = crate::error::ApiErrorResponse),
        (status = 404, description = "No such role record", body = crate::error::ApiErrorResponse)
    ),
    tag = "admins"
)]
pub async fn update_admin(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    body: Result<Json<UpdateAdminRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let Json(body) = body?;
    let (Some(email), Some(raw_role)) = (normalize_email(body.admin_id), body.role) else {
        return Err(ApiError::Validation("adminId and role are required".to_string()));
    };

    forbid_self(&state, &access, &email, "change_role", "SELF_ROLE_CHANGE_FORBIDDEN").await?;
    let role = parse_role(&raw_role)?;

    let previous = state.db.admins().update_role(&email, role).await?;

    info!("{} changed role of {} to {}", access.email, email, role);
    state
        .audit
        .log(
            AuditEventType::AdminRoleChanged,
            access
                .audit_details()
                .with_target_email(email.clone(), role.as_str())
                .with_action("change_role")
                .with_resource("/admin/admins")
                .with_change(previous.map(|p| json!(p)), Some(json!(role.as_str()))),
        )
        .await;

    Ok(Json(SuccessResponse {
        success: true,
        message: format!("Role of {} changed to {}", email, role),
    }))
}

/// Remove the role record of another identity
#[utoipa::path(
    delete,
    path = "/api/v1/admin/admins",
    params(DeleteAdminParams),
    responses(
        (status = 200, description = "Role record removed", body = SuccessResponse),
        (status = 400, description = "Missing id", body = crate::error::ApiErrorResponse),
        (status = 403, description = "Not an admin, or own account", body = crate::error::ApiErrorResponse),
        (status = 404, description = "No such role record", body = crate::error::ApiErrorResponse)
    ),
    tag = "admins"
)]
pub async fn delete_admin(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    Query(params): Query<DeleteAdminParams>,
) -> ApiResult<Json<SuccessResponse>> {
    let Some(email) = normalize_email(params.id) else {
        return Err(ApiError::Validation("id is required".to_string()));
    };

    forbid_self(&state, &access, &email, "delete", "SELF_DELETE_FORBIDDEN").await?;

    let Some(existing) = state.db.admins().get(&email).await? else {
        return Err(ApiError::NotFound(format!("admin {}", email)));
    };
    state.db.admins().delete(&email).await?;

    info!("{} removed role record of {}", access.email, email);
    let target_type = existing
        .resolved_role()
        .map(|role| role.as_str())
        .unwrap_or("unknown");
    state
        .audit
        .log(
            AuditEventType::AdminRemoved,
            access
                .audit_details()
                .with_level(AuditLevel::Warning)
                .with_target_email(email.clone(), target_type)
                .with_action("remove_admin")
                .with_resource("/admin/admins")
                .with_change(existing.role.map(|r| json!(r)), None),
        )
        .await;

    Ok(Json(SuccessResponse {
        success: true,
        message: format!("Removed {}", email),
    }))
}
