use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::round::{CastVoteRequest, PromptReceipt, RoundSnapshot, SubmitPromptRequest, VoteReceipt},
    error::AppError,
    services::{public_service, submission_service},
    state::SharedState,
};

/// Player-facing round endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rounds/{id}", get(get_round))
        .route("/rounds/{id}/prompt", put(submit_prompt))
        .route("/rounds/{id}/vote", put(cast_vote))
}

#[utoipa::path(
    get,
    path = "/rounds/{id}",
    tag = "round",
    params(("id" = Uuid, Path, description = "Identifier of the round")),
    responses(
        (status = 200, description = "Round as visible in its current phase", body = RoundSnapshot),
        (status = 404, description = "Unknown round")
    )
)]
/// Return the round's question, deadline and, depending on the phase, images and tallies.
pub async fn get_round(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoundSnapshot>, AppError> {
    let snapshot = public_service::get_round(&state, id).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    put,
    path = "/rounds/{id}/prompt",
    tag = "round",
    params(("id" = Uuid, Path, description = "Identifier of the round")),
    request_body = SubmitPromptRequest,
    responses(
        (status = 200, description = "Prompt stored", body = PromptReceipt),
        (status = 400, description = "Prompt too short or too long"),
        (status = 403, description = "Player not part of the game"),
        (status = 404, description = "Unknown round"),
        (status = 409, description = "Round is not accepting prompts")
    )
)]
/// Submit or replace the caller's prompt for the round.
pub async fn submit_prompt(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitPromptRequest>>,
) -> Result<Json<PromptReceipt>, AppError> {
    let receipt = submission_service::submit_prompt(&state, id, payload).await?;
    Ok(Json(receipt))
}

#[utoipa::path(
    put,
    path = "/rounds/{id}/vote",
    tag = "round",
    params(("id" = Uuid, Path, description = "Identifier of the round")),
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote stored", body = VoteReceipt),
        (status = 400, description = "Image cannot be voted for"),
        (status = 403, description = "Self vote or player not part of the game"),
        (status = 404, description = "Unknown round or image"),
        (status = 409, description = "Round is not accepting votes")
    )
)]
/// Cast or move the caller's vote for the round.
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CastVoteRequest>>,
) -> Result<Json<VoteReceipt>, AppError> {
    let receipt = submission_service::cast_vote(&state, id, payload).await?;
    Ok(Json(receipt))
}
