//! Login verification.
//!
//! The client signs in with the identity provider and posts the resulting
//! token here. Attempts are rate limited per client address with the login
//! bucket, and every attempt lands in the audit trail.

use abuse_guard::{seconds_until, BucketFamily};
use audit::{AuditDetails, AuditEventType, AuditLevel};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{error, info, warn};

use crate::{
    error::{ApiError, ApiResult},
    middleware_hooks::{bearer_from_headers, client_ip_from},
    models::{VerifyRequest, VerifyResponse},
    AppState,
};

const RESOURCE: &str = "POST /api/v1/auth/verify";

/// Verify an identity token and report the caller's role
///
/// The token is read from the body, falling back to the bearer header.
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Token accepted", body = VerifyResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorResponse),
        (status = 429, description = "Too many attempts from this address", body = crate::error::ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let ip = client_ip_from(
        &headers,
        connect.map(|ConnectInfo(addr)| addr),
        &state.trusted_proxies,
    );
    let key = ip.clone().unwrap_or_else(|| "unknown".to_string());
    let base = || {
        AuditDetails::new()
            .with_ip(ip.clone())
            .with_resource(RESOURCE)
            .with_action("login")
    };

    if let Some(until) = state.guard.blocked_until(&key).await {
        let retry_after = seconds_until(until, state.guard.now_ms());
        warn!("Login attempts from {} blocked for {}s", key, retry_after);
        state
            .audit
            .log(
                AuditEventType::RateLimitExceeded,
                base()
                    .with_level(AuditLevel::Warning)
                    .with_metadata(json!({ "bucket": "login", "retryAfter": retry_after })),
            )
            .await;
        return Err(ApiError::TemporarilyBlocked { retry_after });
    }

    let decision = state.guard.check(BucketFamily::Login, &key).await;
    if !decision.allowed {
        warn!("Login rate limit exceeded for {} (count {})", key, decision.count);
        let mut metadata = json!({
            "bucket": "login",
            "count": decision.count,
            "limit": decision.limit,
            "suspicious": decision.suspicious,
        });
        if decision.suspicious {
            let penalty = state.guard.penalize(&key).await;
            metadata["blockedForSeconds"] = json!(penalty.as_secs());
        }
        state
            .audit
            .log(
                AuditEventType::RateLimitExceeded,
                base().with_level(AuditLevel::Warning).with_metadata(metadata),
            )
            .await;
        return Err(ApiError::RateLimited(decision));
    }

    // An unparsable body still lets the header carry the token.
    let body_token = body.ok().and_then(|Json(body)| body.token);
    let token = body_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer_from_headers(&headers).map(str::to_string));
    let Some(token) = token else {
        state
            .audit
            .log(
                AuditEventType::LoginFailure,
                base().with_level(AuditLevel::Warning).with_error("NO_TOKEN"),
            )
            .await;
        return Err(ApiError::NoToken);
    };

    let verified = match state.verifier.verify(token.trim()).await {
        Ok(verified) => verified,
        Err(e) if e.is_credential_error() => {
            info!("Login rejected from {}: {}", key, e);
            state
                .audit
                .log(
                    AuditEventType::LoginFailure,
                    base()
                        .with_level(AuditLevel::Warning)
                        .with_error(e.to_string()),
                )
                .await;
            return Err(e.into());
        }
        Err(e) => {
            error!("Identity provider failure during login: {}", e);
            state
                .audit
                .log(
                    AuditEventType::AuthServiceError,
                    base().with_level(AuditLevel::Error).with_error(e.to_string()),
                )
                .await;
            return Err(e.into());
        }
    };

    let role = state.roles.get_role(&verified.email).await.map_err(|e| {
        error!("Role lookup failed for {}: {}", verified.email, e);
        ApiError::Internal("role lookup failed".to_string())
    })?;

    info!("Login verified for {} ({:?})", verified.email, role);
    state
        .audit
        .log(
            AuditEventType::LoginSuccess,
            base().with_actor(verified.email.clone(), role.map(|r| r.as_str())),
        )
        .await;

    let mut response = Json(VerifyResponse {
        email: verified.email,
        role: role.map(|r| r.as_str().to_string()),
        expires_at: verified.expires_at,
    })
    .into_response();
    response.extensions_mut().insert(decision);
    Ok(response)
}
