//! Raffle endpoints.
//!
//! Reads are open to event managers holding the raffles page, mutations need
//! an admin. Both are enforced by the access gate; handlers only translate
//! between HTTP and [`raffle::RaffleEngine`].

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use database::{Announcement, Raffle};
use raffle::{CreatedRaffle, DeletedRaffle, NewRaffle, RaffleStats};
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    middleware_hooks::GrantedAccess,
    models::{
        ChangeWinnerRequest, EnrollPostRequest, EnrollPostResponse, ParticipantListResponse,
        RaffleListParams, RaffleListResponse, RaffleStatsParams,
    },
    AppState,
};

/// List raffles, optionally for one event
#[utoipa::path(
    get,
    path = "/api/v1/admin/raffles",
    params(RaffleListParams),
    responses(
        (status = 200, description = "Raffles, newest first", body = RaffleListResponse),
        (status = 403, description = "No access to the raffles page", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn list_raffles(
    State(state): State<AppState>,
    Query(params): Query<RaffleListParams>,
) -> ApiResult<Json<RaffleListResponse>> {
    let event_id = params.event_id.as_deref().filter(|id| !id.is_empty());
    let raffles = state.raffles.list_raffles(event_id).await?;
    Ok(Json(RaffleListResponse {
        total: raffles.len(),
        raffles,
    }))
}

/// Aggregate raffle figures
#[utoipa::path(
    get,
    path = "/api/v1/admin/raffles/stats",
    params(RaffleStatsParams),
    responses(
        (status = 200, description = "Raffle statistics", body = RaffleStats),
        (status = 404, description = "Unknown raffle", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn raffle_stats(
    State(state): State<AppState>,
    Query(params): Query<RaffleStatsParams>,
) -> ApiResult<Json<RaffleStats>> {
    let raffle_id = params.raffle_id.as_deref().filter(|id| !id.is_empty());
    Ok(Json(state.raffles.get_raffle_stats(raffle_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/raffles/{id}",
    params(("id" = String, Path, description = "Raffle id")),
    responses(
        (status = 200, description = "The raffle", body = Raffle),
        (status = 404, description = "Unknown raffle", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn get_raffle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Raffle>> {
    Ok(Json(state.raffles.get_raffle(&id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/raffles/{id}/participants",
    params(("id" = String, Path, description = "Raffle id")),
    responses(
        (status = 200, description = "Participant records in entry order", body = ParticipantListResponse)
    ),
    tag = "raffles"
)]
pub async fn list_participants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ParticipantListResponse>> {
    let participants = state.raffles.get_raffle_participants(&id).await?;
    Ok(Json(ParticipantListResponse {
        total: participants.len(),
        participants,
    }))
}

/// Create a raffle and back-fill participants from existing posts
#[utoipa::path(
    post,
    path = "/api/v1/admin/raffles",
    request_body = NewRaffle,
    responses(
        (status = 200, description = "Raffle created", body = CreatedRaffle),
        (status = 400, description = "Missing eventId or title", body = crate::error::ApiErrorResponse),
        (status = 403, description = "Not an admin", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn create_raffle(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    body: Result<Json<NewRaffle>, JsonRejection>,
) -> ApiResult<Json<CreatedRaffle>> {
    let Json(input) = body?;
    debug!("{} creating raffle for event {}", access.email, input.event_id);
    Ok(Json(state.raffles.create_raffle(input, &access.actor()).await?))
}

/// Draw a winner uniformly from the participant records
#[utoipa::path(
    post,
    path = "/api/v1/admin/raffles/{id}/draw",
    params(("id" = String, Path, description = "Raffle id")),
    responses(
        (status = 200, description = "Drawn raffle", body = Raffle),
        (status = 404, description = "Unknown raffle", body = crate::error::ApiErrorResponse),
        (status = 409, description = "Already completed or no participants", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn draw_winner(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    Path(id): Path<String>,
) -> ApiResult<Json<Raffle>> {
    Ok(Json(state.raffles.draw_winner(&id, &access.actor()).await?))
}

/// Replace the winner with another participant
#[utoipa::path(
    post,
    path = "/api/v1/admin/raffles/{id}/winner",
    params(("id" = String, Path, description = "Raffle id")),
    request_body = ChangeWinnerRequest,
    responses(
        (status = 200, description = "Updated raffle", body = Raffle),
        (status = 400, description = "Not a participant", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Unknown raffle", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn change_winner(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    Path(id): Path<String>,
    body: Result<Json<ChangeWinnerRequest>, JsonRejection>,
) -> ApiResult<Json<Raffle>> {
    let Json(body) = body?;
    let winner_id = body
        .winner_id
        .filter(|w| !w.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("winnerId is required".to_string()))?;
    Ok(Json(
        state
            .raffles
            .change_winner(&id, winner_id.trim(), &access.actor())
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/raffles/{id}/end",
    params(("id" = String, Path, description = "Raffle id")),
    responses(
        (status = 200, description = "Ended raffle", body = Raffle),
        (status = 404, description = "Unknown raffle", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn end_raffle(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    Path(id): Path<String>,
) -> ApiResult<Json<Raffle>> {
    Ok(Json(state.raffles.end_raffle(&id, &access.actor()).await?))
}

/// Publish the winner as an announcement
#[utoipa::path(
    post,
    path = "/api/v1/admin/raffles/{id}/announce",
    params(("id" = String, Path, description = "Raffle id")),
    responses(
        (status = 200, description = "Announcement created", body = Announcement),
        (status = 409, description = "No winner yet, or already announced", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn announce_result(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    Path(id): Path<String>,
) -> ApiResult<Json<Announcement>> {
    Ok(Json(
        state
            .raffles
            .announce_raffle_result(&id, &access.actor())
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/raffles/{id}",
    params(("id" = String, Path, description = "Raffle id")),
    responses(
        (status = 200, description = "Raffle removed with its participants", body = DeletedRaffle),
        (status = 404, description = "Unknown raffle", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn delete_raffle(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedRaffle>> {
    Ok(Json(state.raffles.delete_raffle(&id, &access.actor()).await?))
}

/// Enroll a new post into every open raffle of its event
#[utoipa::path(
    post,
    path = "/api/v1/admin/raffles/enrollments",
    request_body = EnrollPostRequest,
    responses(
        (status = 200, description = "Raffles the post was entered into", body = EnrollPostResponse),
        (status = 404, description = "Unknown post", body = crate::error::ApiErrorResponse)
    ),
    tag = "raffles"
)]
pub async fn enroll_post(
    State(state): State<AppState>,
    Extension(access): Extension<GrantedAccess>,
    body: Result<Json<EnrollPostRequest>, JsonRejection>,
) -> ApiResult<Json<EnrollPostResponse>> {
    let Json(body) = body?;
    let post_id = body
        .post_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("postId is required".to_string()))?;
    let raffle_ids = state.raffles.enroll_post(&post_id, &access.actor()).await?;
    Ok(Json(EnrollPostResponse {
        post_id,
        raffle_ids,
    }))
}
