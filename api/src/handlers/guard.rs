use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use std::net::SocketAddr;

use crate::{
    error::ApiResult,
    middleware_hooks::{bearer_from_headers, client_ip_from},
    models::{GuardRequest, GuardResponse},
    AppState,
};

/// Evaluate the route guard for a page
///
/// Always answers 200; a denial is a redirect verdict.
#[utoipa::path(
    post,
    path = "/api/v1/guard",
    request_body = GuardRequest,
    responses(
        (status = 200, description = "Guard verdict", body = GuardResponse),
        (status = 400, description = "Missing path", body = crate::error::ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn check_route(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<GuardRequest>, JsonRejection>,
) -> ApiResult<Json<GuardResponse>> {
    let Json(request) = body?;
    let ip = client_ip_from(
        &headers,
        connect.map(|ConnectInfo(addr)| addr),
        &state.trusted_proxies,
    );
    let outcome = state
        .route_guard
        .check(bearer_from_headers(&headers), &request.path, ip)
        .await;
    Ok(Json(outcome.into()))
}
