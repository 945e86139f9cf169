use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::RoundEntity,
    dto::{
        format_system_time,
        game::PlayerSummary,
        sse::{
            GameEndedEvent, ImagesReadyEvent, PhaseChangedEvent, RoundScoredEvent, ScoreDelta,
            ServerEvent,
        },
    },
    state::SharedState,
};

pub(crate) const EVENT_PHASE_CHANGED: &str = "round.phase_changed";
pub(crate) const EVENT_IMAGES_READY: &str = "round.images_ready";
pub(crate) const EVENT_ROUND_SCORED: &str = "round.scored";
pub(crate) const EVENT_GAME_ENDED: &str = "game.ended";

/// Broadcast that a round entered a new status.
pub fn broadcast_phase_changed(state: &SharedState, round: &RoundEntity) {
    let payload = PhaseChangedEvent {
        game_id: round.game_id,
        round_id: round.id,
        round_number: round.round_number,
        status: round.status.into(),
        phase_deadline: format_system_time(round.phase_deadline),
    };
    send_public_event(state, EVENT_PHASE_CHANGED, &payload);
}

/// Broadcast that the dispatcher recorded an outcome for every prompt of the round.
pub fn broadcast_images_ready(state: &SharedState, round_id: Uuid, succeeded: usize, failed: usize) {
    let payload = ImagesReadyEvent {
        round_id,
        succeeded,
        failed,
    };
    send_public_event(state, EVENT_IMAGES_READY, &payload);
}

/// Broadcast the points earned during a round along with the refreshed scoreboard.
pub async fn broadcast_round_scored(
    state: &SharedState,
    game_id: Uuid,
    round_id: Uuid,
    deltas: &IndexMap<Uuid, u32>,
) {
    let payload = RoundScoredEvent {
        game_id,
        round_id,
        deltas: deltas
            .iter()
            .map(|(player_id, points)| ScoreDelta {
                player_id: *player_id,
                points: *points,
            })
            .collect(),
        scoreboard: scoreboard(state, game_id).await,
    };
    send_public_event(state, EVENT_ROUND_SCORED, &payload);
}

/// Broadcast that the last round of a game completed.
pub async fn broadcast_game_ended(state: &SharedState, game_id: Uuid) {
    let payload = GameEndedEvent {
        game_id,
        scoreboard: scoreboard(state, game_id).await,
    };
    send_public_event(state, EVENT_GAME_ENDED, &payload);
}

async fn scoreboard(state: &SharedState, game_id: Uuid) -> Vec<PlayerSummary> {
    let Some(store) = state.game_store().await else {
        return Vec::new();
    };
    match store.list_players(game_id).await {
        Ok(players) => {
            let mut board: Vec<PlayerSummary> = players.into_iter().map(Into::into).collect();
            board.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
            board
        }
        Err(err) => {
            warn!(%game_id, error = %err, "failed to load scoreboard for SSE payload");
            Vec::new()
        }
    }
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
