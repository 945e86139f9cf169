use axum::Router;

use crate::state::SharedState;

/// OpenAPI JSON and Swagger UI.
pub mod docs;
/// Game creation and lookup.
pub mod game;
/// Health check.
pub mod health;
/// Prompt submission, voting and round snapshots.
pub mod round;
/// Server-sent event streams.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(game::router())
        .merge(round::router())
        .merge(docs::router())
        .with_state(state)
}
