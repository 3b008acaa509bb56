use abuse_guard::{seconds_until, BucketFamily, RateDecision};
use audit::{AuditDetails, AuditEventType, AuditLevel};
use authz::{AccessRequirement, Role};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::AppState;

/// Page that gates the raffle read model for event managers
pub const RAFFLES_PAGE: &str = "/admin/raffles";

/// Caller identity attached to a request that passed the access gate.
#[derive(Debug, Clone)]
pub struct GrantedAccess {
    pub email: String,
    pub role: Role,
    pub ip: Option<String>,
}

impl GrantedAccess {
    pub fn actor(&self) -> raffle::Actor {
        raffle::Actor::new(self.email.clone())
            .with_role(Some(self.role))
            .with_ip(self.ip.clone())
    }

    pub fn audit_details(&self) -> AuditDetails {
        AuditDetails::new()
            .with_actor(self.email.clone(), Some(self.role.as_str()))
            .with_ip(self.ip.clone())
    }
}

/// Access requirement and rate bucket for a route, or `None` for public routes.
///
/// Raffle reads are open to event managers holding the raffles page; every
/// other admin route requires the admin role.
pub fn requirement_for(method: &Method, path: &str) -> Option<(AccessRequirement, BucketFamily)> {
    let path = path.strip_prefix("/api/v1").unwrap_or(path);
    if path != "/admin" && !path.starts_with("/admin/") {
        return None;
    }

    let requirement = if path.starts_with(RAFFLES_PAGE)
        && (method == Method::GET || method == Method::HEAD)
    {
        AccessRequirement::event_manager(RAFFLES_PAGE)
    } else {
        AccessRequirement::admin()
    };
    Some((requirement, BucketFamily::Admin))
}

/// Client address of a request, see [`client_ip_from`].
pub fn client_ip(request: &Request<Body>, trusted_proxies: &[IpAddr]) -> Option<String> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip_from(request.headers(), peer, trusted_proxies)
}

/// Client address used for auditing and per-client rate buckets.
///
/// The socket peer is the client unless it is one of `trusted_proxies`.
/// Only then are proxy headers read: the nearest `X-Forwarded-For` hop that
/// is not itself a trusted proxy, then `X-Real-IP`. Without a peer address
/// the client is unknown.
pub fn client_ip_from(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<String> {
    let peer = peer?.ip();
    if !trusted_proxies.contains(&peer) {
        return Some(peer.to_string());
    }

    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        for hop in forwarded.rsplit(',').map(str::trim).filter(|hop| !hop.is_empty()) {
            match hop.parse::<IpAddr>() {
                Ok(ip) if trusted_proxies.contains(&ip) => continue,
                Ok(ip) => return Some(ip.to_string()),
                Err(_) => break,
            }
        }
    }
    let real_ip = header_str(headers, "x-real-ip").and_then(|v| v.trim().parse::<IpAddr>().ok());
    if let Some(real_ip) = real_ip {
        return Some(real_ip.to_string());
    }
    Some(peer.to_string())
}

/// Bearer token from the `Authorization` header
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, header::AUTHORIZATION.as_str()).and_then(identity::bearer_token)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Write the `X-RateLimit-*` headers for `decision`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(decision.reset_time));
    headers.insert(
        "X-RateLimit-RetryAfter",
        HeaderValue::from(decision.retry_after_seconds),
    );
    if decision.suspicious {
        headers.insert("X-RateLimit-Suspicious", HeaderValue::from_static("true"));
    }
}

/// Access gate for admin routes.
///
/// Checks run strictly in order and stop at the first failure: bearer
/// credential, token verification, block status, rate limit, role. Every
/// denial is written to the audit trail before the error is returned.
pub async fn access_gate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some((requirement, family)) = requirement_for(&method, &path) else {
        return next.run(request).await;
    };

    let ip = client_ip(&request, &state.trusted_proxies);
    let resource = format!("{} {}", method, path);
    let base = || AuditDetails::new().with_ip(ip.clone()).with_resource(resource.clone());

    let Some(token) = bearer_from_headers(request.headers()).map(str::to_string) else {
        debug!("ACCESS GATE: no credential for {}", resource);
        state
            .audit
            .log(
                AuditEventType::UnauthorizedAccess,
                base().with_level(AuditLevel::Warning).with_action("missing_token"),
            )
            .await;
        return ApiError::NoToken.into_response();
    };

    let verified = match state.verifier.verify(&token).await {
        Ok(verified) => verified,
        Err(e) if e.is_credential_error() => {
            info!("ACCESS GATE: rejected credential for {}: {}", resource, e);
            state
                .audit
                .log(
                    AuditEventType::UnauthorizedAccess,
                    base()
                        .with_level(AuditLevel::Warning)
                        .with_action("invalid_token")
                        .with_error(e.to_string()),
                )
                .await;
            return ApiError::InvalidToken(e.to_string()).into_response();
        }
        Err(e) => {
            error!("ACCESS GATE: identity provider failure: {}", e);
            state
                .audit
                .log(
                    AuditEventType::AuthServiceError,
                    base().with_level(AuditLevel::Error).with_error(e.to_string()),
                )
                .await;
            return ApiError::from(e).into_response();
        }
    };
    let email = verified.email;

    if let Some(until) = state.guard.blocked_until(&email).await {
        let retry_after = seconds_until(until, state.guard.now_ms());
        warn!("ACCESS GATE: {} is blocked for {}s", email, retry_after);
        state
            .audit
            .log(
                AuditEventType::RateLimitExceeded,
                base()
                    .with_actor(email.clone(), None)
                    .with_level(AuditLevel::Warning)
                    .with_action("blocked")
                    .with_metadata(json!({ "retryAfter": retry_after })),
            )
            .await;
        return ApiError::TemporarilyBlocked { retry_after }.into_response();
    }

    let decision = state.guard.check(family, &email).await;
    if !decision.allowed {
        warn!(
            "ACCESS GATE: rate limit exceeded for {} ({} bucket, count {})",
            email, family, decision.count
        );
        let mut metadata = json!({
            "bucket": family.to_string(),
            "count": decision.count,
            "limit": decision.limit,
            "suspicious": decision.suspicious,
        });
        if decision.suspicious {
            let penalty = state.guard.penalize(&email).await;
            metadata["blockedForSeconds"] = json!(penalty.as_secs());
        }
        state
            .audit
            .log(
                AuditEventType::RateLimitExceeded,
                base()
                    .with_actor(email.clone(), None)
                    .with_level(AuditLevel::Warning)
                    .with_metadata(metadata),
            )
            .await;
        return ApiError::RateLimited(decision).into_response();
    }

    let role = match state.roles.get_role(&email).await {
        Ok(role) => role,
        Err(e) => {
            error!("ACCESS GATE: role lookup failed for {}: {}", email, e);
            state
                .audit
                .log(
                    AuditEventType::SystemError,
                    base()
                        .with_actor(email.clone(), None)
                        .with_level(AuditLevel::Error)
                        .with_error(e.to_string()),
                )
                .await;
            return ApiError::Internal("role lookup failed".to_string()).into_response();
        }
    };

    let granted_role = match role {
        Some(role) if requirement.permits(Some(role)) => role,
        _ => {
            warn!(
                "ACCESS GATE: {} ({:?}) lacks {} for {}",
                email, role, requirement.role, resource
            );
            state
                .audit
                .log(
                    AuditEventType::PermissionDenied,
                    base()
                        .with_actor(email.clone(), role.map(|r| r.as_str()))
                        .with_level(AuditLevel::Warning)
                        .with_metadata(json!({
                            "requiredRole": requirement.role.as_str(),
                            "actualRole": role.map(|r| r.as_str()),
                            "page": requirement.page,
                        })),
                )
                .await;
            let mut response = ApiError::InsufficientPermissions {
                required: requirement.role,
                actual: role,
            }
            .into_response();
            apply_rate_limit_headers(response.headers_mut(), &decision);
            return response;
        }
    };

    debug!("ACCESS GATE: granted {} as {} for {}", email, granted_role, resource);
    request.extensions_mut().insert(GrantedAccess {
        email,
        role: granted_role,
        ip,
    });

    let mut response = next.run(request).await;
    response.extensions_mut().insert(decision);
    response
}

/// Request processing middleware hook
///
/// Tags every request with an id and logs its duration.
pub async fn request_middleware(mut request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = ulid::Ulid::new().to_string();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert("x-request-id", value);
    }

    debug!("REQUEST {}: {} {}", request_id, method, uri);

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    info!(
        "{} {} -> {} in {:?}",
        method,
        uri,
        response.status(),
        start.elapsed()
    );
    response
}

/// Response processing middleware hook
///
/// Copies the rate decision left by the access gate into response headers.
pub async fn response_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    if let Some(decision) = response.extensions().get::<RateDecision>().cloned() {
        apply_rate_limit_headers(response.headers_mut(), &decision);
    }

    response
}
