use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::game::{GameSummary, StartGameRequest},
    error::AppError,
    services::{public_service, round_service},
    state::SharedState,
};

/// Routes creating games and exposing their scoreboard.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(start_game))
        .route("/games/{id}", get(get_game))
}

/// Create a game with its players and open the first round.
#[utoipa::path(
    post,
    path = "/games",
    tag = "game",
    request_body = StartGameRequest,
    responses(
        (status = 201, description = "Game started", body = GameSummary),
        (status = 400, description = "Invalid roster or round count"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<StartGameRequest>>,
) -> Result<(StatusCode, Json<GameSummary>), AppError> {
    let summary = round_service::start_game(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Return a game with its players ordered by score and its current round.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "game",
    params(("id" = Uuid, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game found", body = GameSummary),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = public_service::get_game(&state, id).await?;
    Ok(Json(summary))
}
