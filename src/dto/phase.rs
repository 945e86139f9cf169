use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{GameStatus, RoundStatus};

/// Round status exposed to clients (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleRoundStatus {
    /// Players are writing prompts.
    Prompt,
    /// Images are being generated.
    Generating,
    /// Players are voting.
    Voting,
    /// Round scores are displayed.
    Results,
    /// The round is over.
    Complete,
}

impl From<RoundStatus> for VisibleRoundStatus {
    fn from(value: RoundStatus) -> Self {
        match value {
            RoundStatus::Prompt => VisibleRoundStatus::Prompt,
            RoundStatus::Generating => VisibleRoundStatus::Generating,
            RoundStatus::Voting => VisibleRoundStatus::Voting,
            RoundStatus::Results => VisibleRoundStatus::Results,
            RoundStatus::Complete => VisibleRoundStatus::Complete,
        }
    }
}

/// Game status exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleGameStatus {
    /// Rounds are being played.
    Active,
    /// Every round has been played.
    Ended,
}

impl From<GameStatus> for VisibleGameStatus {
    fn from(value: GameStatus) -> Self {
        match value {
            GameStatus::Active => VisibleGameStatus::Active,
            GameStatus::Ended => VisibleGameStatus::Ended,
        }
    }
}
