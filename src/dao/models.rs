use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifecycle status of a round. Transitions only move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Players submit their prompts.
    Prompt,
    /// Images are being generated from the submitted prompts.
    Generating,
    /// Players vote on the generated images.
    Voting,
    /// Scores for the round are displayed.
    Results,
    /// Terminal status; the round is kept as a historical record.
    Complete,
}

impl RoundStatus {
    /// Stable lowercase name used by storage filters and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Prompt => "prompt",
            RoundStatus::Generating => "generating",
            RoundStatus::Voting => "voting",
            RoundStatus::Results => "results",
            RoundStatus::Complete => "complete",
        }
    }

    /// Parse the value produced by [`RoundStatus::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "prompt" => Some(RoundStatus::Prompt),
            "generating" => Some(RoundStatus::Generating),
            "voting" => Some(RoundStatus::Voting),
            "results" => Some(RoundStatus::Results),
            "complete" => Some(RoundStatus::Complete),
            _ => None,
        }
    }

    /// Whether the round is the current (non-terminal) round of its game.
    pub fn is_open(self) -> bool {
        self != RoundStatus::Complete
    }
}

/// Lifecycle status of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Rounds are being played.
    Active,
    /// The configured number of rounds has been played.
    Ended,
}

impl GameStatus {
    /// Stable lowercase name used by storage filters.
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Ended => "ended",
        }
    }
}

/// Aggregate game entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key of the game (one game per room).
    pub id: Uuid,
    /// Display name of the room.
    pub name: String,
    /// Number of rounds configured for this game.
    pub total_rounds: u32,
    /// Current lifecycle status.
    pub status: GameStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Set once the last round completed.
    pub ended_at: Option<SystemTime>,
}

/// Score-bearing projection of a room member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier for the player.
    pub id: Uuid,
    /// Game the player belongs to.
    pub game_id: Uuid,
    /// Display name chosen by the player.
    pub name: String,
    /// Cumulative score over every scored round.
    pub score: u32,
}

/// A single round of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Primary key of the round.
    pub id: Uuid,
    /// Owning game.
    pub game_id: Uuid,
    /// 1-based round number, monotonic per game.
    pub round_number: u32,
    /// Current lifecycle status.
    pub status: RoundStatus,
    /// Absolute end of the current phase.
    pub phase_deadline: SystemTime,
    /// Question the players answer with their prompts.
    pub question_text: String,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// When the current status was entered.
    pub status_changed_at: SystemTime,
    /// When the round entered the generating phase.
    pub generation_started_at: Option<SystemTime>,
    /// When the dispatcher was handed the prompts (at most once per round).
    pub generation_dispatched_at: Option<SystemTime>,
    /// When the dispatcher finished processing every prompt.
    pub generation_completed_at: Option<SystemTime>,
    /// Round-level generation diagnostic (informational only).
    pub generation_error: Option<String>,
    /// Set once the votes of the round have been turned into points.
    pub scored_at: Option<SystemTime>,
    /// Set once the round reached [`RoundStatus::Complete`].
    pub ended_at: Option<SystemTime>,
}

/// Partial update applied to a round. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundPatch {
    /// New status.
    pub status: Option<RoundStatus>,
    /// New end of the current phase.
    pub phase_deadline: Option<SystemTime>,
    /// Time of the status change.
    pub status_changed_at: Option<SystemTime>,
    /// Start of the generation phase.
    pub generation_started_at: Option<SystemTime>,
    /// Claim marking the prompts as handed to the dispatcher.
    pub generation_dispatched_at: Option<SystemTime>,
    /// Every prompt has its outcome recorded.
    pub generation_completed_at: Option<SystemTime>,
    /// Round-level generation failure.
    pub generation_error: Option<String>,
    /// Claim marking the round as scored.
    pub scored_at: Option<SystemTime>,
    /// Time the round completed.
    pub ended_at: Option<SystemTime>,
}

impl RoundPatch {
    /// Apply the patch onto an in-memory round.
    pub fn apply_to(&self, round: &mut RoundEntity) {
        if let Some(status) = self.status {
            round.status = status;
        }
        if let Some(deadline) = self.phase_deadline {
            round.phase_deadline = deadline;
        }
        if let Some(at) = self.status_changed_at {
            round.status_changed_at = at;
        }
        if let Some(at) = self.generation_started_at {
            round.generation_started_at = Some(at);
        }
        if let Some(at) = self.generation_dispatched_at {
            round.generation_dispatched_at = Some(at);
        }
        if let Some(at) = self.generation_completed_at {
            round.generation_completed_at = Some(at);
        }
        if let Some(error) = &self.generation_error {
            round.generation_error = Some(error.clone());
        }
        if let Some(at) = self.scored_at {
            round.scored_at = Some(at);
        }
        if let Some(at) = self.ended_at {
            round.ended_at = Some(at);
        }
    }
}

/// Precondition checked atomically before a [`RoundPatch`] is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundGuard {
    /// Unconditional update.
    Any,
    /// The round must currently be in the given status.
    Status(RoundStatus),
    /// The round must not have been scored yet.
    NotScored,
    /// The round's prompts must not have been handed to the dispatcher yet.
    NotDispatched,
}

impl RoundGuard {
    /// Evaluate the guard against the current persisted round.
    pub fn allows(self, round: &RoundEntity) -> bool {
        match self {
            RoundGuard::Any => true,
            RoundGuard::Status(status) => round.status == status,
            RoundGuard::NotScored => round.scored_at.is_none(),
            RoundGuard::NotDispatched => round.generation_dispatched_at.is_none(),
        }
    }
}

/// A player's prompt for a round. Unique per (round, player).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptEntity {
    /// Identifier of the prompt.
    pub id: Uuid,
    /// Round the prompt belongs to.
    pub round_id: Uuid,
    /// Author of the prompt.
    pub player_id: Uuid,
    /// Trimmed prompt text.
    pub text: String,
    /// Time of the latest (re)submission.
    pub submitted_at: SystemTime,
}

/// Outcome recorded for a prompt by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageOutcome {
    /// The provider returned an artifact.
    Success {
        /// URL or storage reference of the artifact.
        image_url: String,
    },
    /// The provider failed for this prompt.
    Failed {
        /// Human readable failure reason.
        error: String,
    },
}

/// Provider diagnostics attached to a generated image row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationMetadata {
    /// Name of the provider that produced the outcome.
    pub provider: String,
    /// Wall-clock time spent in the provider call.
    pub elapsed_ms: u64,
    /// Whether the outcome came from the fallback provider.
    pub fallback: bool,
}

/// Generation result for a prompt. At most one per prompt, immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedImageEntity {
    /// Identifier of the row.
    pub id: Uuid,
    /// Prompt the image was generated for.
    pub prompt_id: Uuid,
    /// Denormalised round id so a round's images can be listed directly.
    pub round_id: Uuid,
    /// Success or failure of the generation.
    pub outcome: ImageOutcome,
    /// Provider diagnostics.
    pub metadata: GenerationMetadata,
    /// Time the outcome was recorded.
    pub created_at: SystemTime,
}

impl GeneratedImageEntity {
    /// Artifact reference when the generation succeeded.
    pub fn image_url(&self) -> Option<&str> {
        match &self.outcome {
            ImageOutcome::Success { image_url } => Some(image_url),
            ImageOutcome::Failed { .. } => None,
        }
    }

    /// Failure reason when the generation failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ImageOutcome::Success { .. } => None,
            ImageOutcome::Failed { error } => Some(error),
        }
    }
}

/// A player's vote for a round. Unique per (round, voter).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    /// Identifier of the vote.
    pub id: Uuid,
    /// Round the vote belongs to.
    pub round_id: Uuid,
    /// Player who voted.
    pub voter_id: Uuid,
    /// Image voted for.
    pub image_id: Uuid,
    /// Time of the latest (re)submission.
    pub cast_at: SystemTime,
}
