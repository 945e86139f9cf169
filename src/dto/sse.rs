use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::{game::PlayerSummary, phase::VisibleRoundStatus};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// Optional SSE event name.
    pub event: Option<String>,
    /// Serialised payload.
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already serialised payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a round enters a new status.
pub struct PhaseChangedEvent {
    /// Game the round belongs to.
    pub game_id: Uuid,
    /// Round that changed status.
    pub round_id: Uuid,
    /// 1-based round number.
    pub round_number: u32,
    /// New status.
    pub status: VisibleRoundStatus,
    /// RFC 3339 end of the new phase.
    pub phase_deadline: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once every prompt of a round has a generation outcome.
pub struct ImagesReadyEvent {
    /// Round whose images are ready.
    pub round_id: Uuid,
    /// Prompts with a generated image.
    pub succeeded: usize,
    /// Prompts whose generation failed.
    pub failed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Points earned by a player in a round.
pub struct ScoreDelta {
    /// Player credited.
    pub player_id: Uuid,
    /// Points earned in the round.
    pub points: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a round's votes have been turned into points.
pub struct RoundScoredEvent {
    /// Game the round belongs to.
    pub game_id: Uuid,
    /// Scored round.
    pub round_id: Uuid,
    /// Points earned in the round, per player.
    pub deltas: Vec<ScoreDelta>,
    /// Cumulative scores after the round, best first.
    pub scoreboard: Vec<PlayerSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the last round of a game completed.
pub struct GameEndedEvent {
    /// Ended game.
    pub game_id: Uuid,
    /// Final scores, best first.
    pub scoreboard: Vec<PlayerSummary>,
}
