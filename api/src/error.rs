use abuse_guard::RateDecision;
use authz::Role;
use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use database::DatabaseError;
use identity::IdentityError;
use raffle::RaffleError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::middleware_hooks::apply_rate_limit_headers;

/// API Error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required")]
    NoToken,

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Too many violations; temporarily blocked")]
    TemporarilyBlocked { retry_after: u64 },

    #[error("Rate limit exceeded")]
    RateLimited(RateDecision),

    #[error("Insufficient permissions")]
    InsufficientPermissions {
        required: Role,
        actual: Option<Role>,
    },

    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("{message}")]
    Domain {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Authentication service error: {0}")]
    AuthService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error envelope: `{error, code, ...extra}`
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoToken | ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::TemporarilyBlocked { .. } | ApiError::RateLimited(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::InsufficientPermissions { .. } | ApiError::Forbidden { .. } => {
                StatusCode::FORBIDDEN
            }
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Domain { status, .. } => *status,
            ApiError::AuthService(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get error code for the error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NoToken => "NO_TOKEN",
            ApiError::InvalidToken(_) => "INVALID_TOKEN",
            ApiError::TemporarilyBlocked { .. } => "TEMPORARILY_BLOCKED",
            ApiError::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            ApiError::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            ApiError::Forbidden { code, .. } => *code,
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict { code, .. } => *code,
            ApiError::Domain { code, .. } => *code,
            ApiError::AuthService(_) => "AUTH_SERVICE_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn extra(&self) -> Map<String, Value> {
        let extra = match self {
            ApiError::TemporarilyBlocked { retry_after } => json!({ "retryAfter": retry_after }),
            ApiError::RateLimited(decision) => json!({
                "retryAfter": decision.retry_after_seconds,
                "limit": decision.limit,
                "resetTime": decision.reset_time,
            }),
            ApiError::InsufficientPermissions { required, actual } => json!({
                "requiredRole": required.as_str(),
                "currentRole": actual.map(|role| role.as_str()),
            }),
            _ => json!({}),
        };
        match extra {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(self.to_string()));
        body.insert("code".to_string(), Value::String(self.error_code().to_string()));
        body.extend(self.extra());

        let mut response = (status, Json(Value::Object(body))).into_response();
        match &self {
            ApiError::RateLimited(decision) => {
                apply_rate_limit_headers(response.headers_mut(), decision);
                response
                    .headers_mut()
                    .insert("Retry-After", HeaderValue::from(decision.retry_after_seconds));
            }
            ApiError::TemporarilyBlocked { retry_after } => {
                response
                    .headers_mut()
                    .insert("Retry-After", HeaderValue::from(*retry_after));
            }
            _ => {}
        }
        response
    }
}

/// Convert database errors to API errors
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => ApiError::NotFound(what),
            DatabaseError::Duplicate(what) => ApiError::Conflict {
                code: "DUPLICATE",
                message: format!("Already exists: {}", what),
            },
            DatabaseError::Validation(msg) => ApiError::Validation(msg),
            other => ApiError::Database(other.to_string()),
        }
    }
}

impl From<RaffleError> for ApiError {
    fn from(err: RaffleError) -> Self {
        let status = match &err {
            RaffleError::NotFound(_) => StatusCode::NOT_FOUND,
            RaffleError::AlreadyCompleted(_)
            | RaffleError::NoParticipants(_)
            | RaffleError::NotReady(_)
            | RaffleError::AlreadyAnnounced(_) => StatusCode::CONFLICT,
            RaffleError::NotAParticipant { .. } | RaffleError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            RaffleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match err {
            RaffleError::Storage(db) => ApiError::from(db),
            other => ApiError::Domain {
                status,
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::MissingToken => ApiError::NoToken,
            e if e.is_credential_error() => ApiError::InvalidToken(e.to_string()),
            e => ApiError::AuthService(e.to_string()),
        }
    }
}

/// Malformed or incomplete request bodies are a 400, not axum's default 422
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ApiError::NoToken, StatusCode::UNAUTHORIZED, "NO_TOKEN")]
    #[case(ApiError::InvalidToken("x".into()), StatusCode::UNAUTHORIZED, "INVALID_TOKEN")]
    #[case(ApiError::TemporarilyBlocked { retry_after: 5 }, StatusCode::TOO_MANY_REQUESTS, "TEMPORARILY_BLOCKED")]
    #[case(ApiError::Validation("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR")]
    #[case(ApiError::from(RaffleError::NotReady("r".into())), StatusCode::CONFLICT, "NOT_READY")]
    #[case(ApiError::from(RaffleError::NotFound("r".into())), StatusCode::NOT_FOUND, "NOT_FOUND")]
    #[case(ApiError::from(DatabaseError::Validation("x".into())), StatusCode::BAD_REQUEST, "VALIDATION_ERROR")]
    #[case(ApiError::from(IdentityError::Expired), StatusCode::UNAUTHORIZED, "INVALID_TOKEN")]
    #[case(ApiError::from(IdentityError::Unavailable("down".into())), StatusCode::INTERNAL_SERVER_ERROR, "AUTH_SERVICE_ERROR")]
    fn test_status_and_code(
        #[case] err: ApiError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.error_code(), code);
    }

    #[tokio::test]
    async fn test_envelope_carries_extra_fields() {
        let err = ApiError::InsufficientPermissions {
            required: Role::Admin,
            actual: Some(Role::EventManager),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "INSUFFICIENT_PERMISSIONS");
        assert_eq!(body["requiredRole"], "admin");
        assert_eq!(body["currentRole"], "event_manager");
        assert!(body["error"].is_string());
    }
}
