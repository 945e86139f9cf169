use std::{sync::Arc, time::SystemTime};

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        game_store::GameStore,
        models::{RoundEntity, RoundStatus},
    },
    dto::round::{CastVoteRequest, PromptReceipt, SubmitPromptRequest, VoteReceipt},
    error::ServiceError,
    state::SharedState,
};

/// Store a player's prompt for a round in its prompt phase. Resubmitting replaces the text.
pub async fn submit_prompt(
    state: &SharedState,
    round_id: Uuid,
    request: SubmitPromptRequest,
) -> Result<PromptReceipt, ServiceError> {
    request.validate()?;
    let store = state.require_game_store().await?;
    let round = load_round(&store, round_id).await?;
    ensure_status(&round, RoundStatus::Prompt, "prompts")?;
    ensure_member(&store, &round, request.player_id).await?;

    let prompt = store
        .upsert_prompt(
            round_id,
            request.player_id,
            request.text.trim().to_owned(),
            SystemTime::now(),
        )
        .await?;
    info!(%round_id, player_id = %prompt.player_id, "prompt submitted");
    Ok(prompt.into())
}

/// Store a player's vote for an image of a round in its voting phase. Voting again moves the
/// vote.
pub async fn cast_vote(
    state: &SharedState,
    round_id: Uuid,
    request: CastVoteRequest,
) -> Result<VoteReceipt, ServiceError> {
    let store = state.require_game_store().await?;
    let round = load_round(&store, round_id).await?;
    ensure_status(&round, RoundStatus::Voting, "votes")?;
    ensure_member(&store, &round, request.voter_id).await?;

    let image = store
        .find_generated_image(request.image_id)
        .await?
        .filter(|image| image.round_id == round_id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "image `{}` not found in round `{round_id}`",
                request.image_id
            ))
        })?;
    if image.image_url().is_none() {
        return Err(ServiceError::InvalidInput(
            "cannot vote for an image whose generation failed".into(),
        ));
    }
    let author = store.find_prompt(image.prompt_id).await?;
    if author.is_some_and(|prompt| prompt.player_id == request.voter_id) {
        return Err(ServiceError::Forbidden(
            "players cannot vote for their own image".into(),
        ));
    }

    let vote = store
        .upsert_vote(round_id, request.voter_id, image.id, SystemTime::now())
        .await?;
    info!(%round_id, voter_id = %vote.voter_id, "vote cast");
    Ok(vote.into())
}

async fn load_round(
    store: &Arc<dyn GameStore>,
    round_id: Uuid,
) -> Result<RoundEntity, ServiceError> {
    store
        .find_round(round_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("round `{round_id}` not found")))
}

fn ensure_status(
    round: &RoundEntity,
    expected: RoundStatus,
    what: &str,
) -> Result<(), ServiceError> {
    if round.status != expected {
        return Err(ServiceError::InvalidState(format!(
            "round is in the {} phase and no longer accepts {what}",
            round.status.as_str()
        )));
    }
    Ok(())
}

async fn ensure_member(
    store: &Arc<dyn GameStore>,
    round: &RoundEntity,
    player_id: Uuid,
) -> Result<(), ServiceError> {
    let players = store.list_players(round.game_id).await?;
    if !players.iter().any(|player| player.id == player_id) {
        return Err(ServiceError::Forbidden(format!(
            "player `{player_id}` does not belong to this game"
        )));
    }
    Ok(())
}
