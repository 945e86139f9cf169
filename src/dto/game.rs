use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{GameEntity, PlayerEntity, RoundEntity},
    dto::{
        format_system_time,
        phase::{VisibleGameStatus, VisibleRoundStatus},
        validation::validate_player_names,
    },
};

/// Payload used to start a brand-new game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartGameRequest {
    /// Display name of the room.
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    /// Player display names, in seating order.
    #[validate(custom(function = "validate_player_names"))]
    pub players: Vec<String>,
    /// Number of rounds to play. Uses the configured default when omitted.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub total_rounds: Option<u32>,
}

/// Score-bearing view of a player.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    /// Identifier of the player.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Cumulative score.
    pub score: u32,
}

impl From<PlayerEntity> for PlayerSummary {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            score: value.score,
        }
    }
}

/// Compact view of the round currently being played.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct RoundBrief {
    /// Identifier of the round.
    pub id: Uuid,
    /// 1-based round number.
    pub round_number: u32,
    /// Current status.
    pub status: VisibleRoundStatus,
    /// RFC 3339 end of the current phase.
    pub phase_deadline: String,
}

impl From<&RoundEntity> for RoundBrief {
    fn from(value: &RoundEntity) -> Self {
        Self {
            id: value.id,
            round_number: value.round_number,
            status: value.status.into(),
            phase_deadline: format_system_time(value.phase_deadline),
        }
    }
}

/// Game overview returned by `POST /games` and `GET /games/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameSummary {
    /// Identifier of the game.
    pub id: Uuid,
    /// Display name of the room.
    pub name: String,
    /// Whether the game is still being played.
    pub status: VisibleGameStatus,
    /// Number of rounds the game lasts.
    pub total_rounds: u32,
    /// Number of rounds created so far, the current one included.
    pub rounds_played: u32,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 end time, once the game ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Players ordered by descending score.
    pub players: Vec<PlayerSummary>,
    /// Absent once the last round completed.
    pub current_round: Option<RoundBrief>,
}

impl GameSummary {
    /// Assemble the summary from the persisted game, its players and rounds.
    pub fn build(game: GameEntity, players: Vec<PlayerEntity>, rounds: &[RoundEntity]) -> Self {
        let mut players: Vec<PlayerSummary> = players.into_iter().map(Into::into).collect();
        players.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        let current_round = rounds
            .iter()
            .filter(|round| round.status.is_open())
            .max_by_key(|round| round.round_number)
            .map(RoundBrief::from);

        Self {
            id: game.id,
            name: game.name,
            status: game.status.into(),
            total_rounds: game.total_rounds,
            rounds_played: rounds.len() as u32,
            created_at: format_system_time(game.created_at),
            ended_at: game.ended_at.map(format_system_time),
            players,
            current_round,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_rejects_bad_rosters() {
        let request = StartGameRequest {
            name: "room".into(),
            players: vec!["ann".into(), "ANN".into()],
            total_rounds: Some(2),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("players"));

        let request = StartGameRequest {
            name: "room".into(),
            players: vec!["ann".into(), "bob".into()],
            total_rounds: Some(0),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("total_rounds"));
    }

    #[test]
    fn start_request_accepts_minimal_roster() {
        let request: StartGameRequest =
            serde_json::from_str(r#"{"name": "room", "players": ["ann", "bob"]}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.total_rounds, None);
    }
}
