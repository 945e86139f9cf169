use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{PromptEntity, VoteEntity},
    dto::{format_system_time, phase::VisibleRoundStatus, validation::validate_prompt_text},
};

/// Prompt submitted (or resubmitted) by a player during the prompt phase.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitPromptRequest {
    /// Player submitting the prompt.
    pub player_id: Uuid,
    /// 3 to 200 characters once trimmed.
    #[validate(custom(function = "validate_prompt_text"))]
    pub text: String,
}

/// Vote cast (or changed) by a player during the voting phase.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CastVoteRequest {
    /// Player casting the vote.
    pub voter_id: Uuid,
    /// Generated image voted for. Must belong to the round and to another player.
    pub image_id: Uuid,
}

/// Stored prompt returned after a submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct PromptReceipt {
    /// Identifier of the stored prompt.
    pub prompt_id: Uuid,
    /// Round the prompt belongs to.
    pub round_id: Uuid,
    /// Author of the prompt.
    pub player_id: Uuid,
    /// Stored text, trimmed.
    pub text: String,
    /// RFC 3339 time of the latest submission.
    pub submitted_at: String,
}

impl From<PromptEntity> for PromptReceipt {
    fn from(value: PromptEntity) -> Self {
        Self {
            prompt_id: value.id,
            round_id: value.round_id,
            player_id: value.player_id,
            text: value.text,
            submitted_at: format_system_time(value.submitted_at),
        }
    }
}

/// Stored vote returned after a submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteReceipt {
    /// Identifier of the stored vote.
    pub vote_id: Uuid,
    /// Round the vote belongs to.
    pub round_id: Uuid,
    /// Player who voted.
    pub voter_id: Uuid,
    /// Image currently voted for.
    pub image_id: Uuid,
    /// RFC 3339 time of the latest vote change.
    pub cast_at: String,
}

impl From<VoteEntity> for VoteReceipt {
    fn from(value: VoteEntity) -> Self {
        Self {
            vote_id: value.id,
            round_id: value.round_id,
            voter_id: value.voter_id,
            image_id: value.image_id,
            cast_at: format_system_time(value.cast_at),
        }
    }
}

/// Generated image as shown to voters. Failed generations carry an error instead of a URL.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct ImageSummary {
    /// Identifier of the generated image.
    pub id: Uuid,
    /// Artifact reference when generation succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Failure reason when generation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Revealed once the round reaches its results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<Uuid>,
}

/// Number of votes an image received.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct VoteTally {
    /// Voted image.
    pub image_id: Uuid,
    /// Votes received.
    pub votes: u32,
}

/// Round-level generation diagnostics. Informational only.
#[derive(Debug, Serialize, ToSchema, Default)]
pub struct GenerationDiagnostics {
    /// RFC 3339 start of the generation phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// RFC 3339 time every prompt had its outcome recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Round-level failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Public view of a round returned by `GET /rounds/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundSnapshot {
    /// Identifier of the round.
    pub id: Uuid,
    /// Game the round belongs to.
    pub game_id: Uuid,
    /// 1-based position of the round in its game.
    pub round_number: u32,
    /// Current status.
    pub status: VisibleRoundStatus,
    /// RFC 3339 end of the current phase.
    pub phase_deadline: String,
    /// Question players write prompts for.
    pub question: String,
    /// Number of players who submitted a prompt.
    pub prompt_count: usize,
    /// Present from the voting phase on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageSummary>>,
    /// Present from the results phase on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tallies: Option<Vec<VoteTally>>,
    /// Generation diagnostics.
    pub generation: GenerationDiagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_request_validates_trimmed_length() {
        let request = SubmitPromptRequest {
            player_id: Uuid::new_v4(),
            text: "  hi  ".into(),
        };
        assert!(request.validate().is_err());

        let request = SubmitPromptRequest {
            player_id: Uuid::new_v4(),
            text: "  a cat  ".into(),
        };
        assert!(request.validate().is_ok());
    }
}
