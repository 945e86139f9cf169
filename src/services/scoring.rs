use std::{collections::HashMap, time::SystemTime};

use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::ScoringConfig,
    dao::models::{RoundGuard, RoundPatch, VoteEntity},
    error::ServiceError,
    services::sse_events,
    state::SharedState,
};

/// Turn a round's votes into per-player point deltas.
///
/// The most-voted images share `points_per_win` evenly, rounding down, so ties may award
/// less than `points_per_win` in total and never more. Every vote record earns its voter
/// `points_per_vote`. Players absent from the result earn nothing. Insertion order follows
/// the votes, which keeps the output deterministic.
pub fn score(
    votes: &[VoteEntity],
    image_owner: &HashMap<Uuid, Uuid>,
    points: ScoringConfig,
) -> IndexMap<Uuid, u32> {
    let mut tallies: IndexMap<Uuid, u32> = IndexMap::new();
    for vote in votes {
        *tallies.entry(vote.image_id).or_default() += 1;
    }

    let mut deltas: IndexMap<Uuid, u32> = IndexMap::new();
    let max_votes = tallies.values().copied().max().unwrap_or(0);
    if max_votes > 0 {
        let winners: Vec<Uuid> = tallies
            .iter()
            .filter(|(_, count)| **count == max_votes)
            .map(|(image_id, _)| *image_id)
            .collect();
        let share = points.points_per_win / winners.len() as u32;
        for image_id in winners {
            if let Some(owner) = image_owner.get(&image_id) {
                *deltas.entry(*owner).or_default() += share;
            }
        }
    }

    for vote in votes {
        *deltas.entry(vote.voter_id).or_default() += points.points_per_vote;
    }

    deltas.retain(|_, delta| *delta > 0);
    deltas
}

/// Score a round exactly once and add the deltas to the players' cumulative scores.
///
/// The round is claimed through its `scored_at` marker before any score changes, so a
/// second invocation is rejected instead of applying the points twice.
pub async fn apply_round_scores(
    state: &SharedState,
    round_id: Uuid,
) -> Result<IndexMap<Uuid, u32>, ServiceError> {
    let store = state.require_game_store().await?;
    let round = store
        .find_round(round_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("round `{round_id}` not found")))?;
    if round.scored_at.is_some() {
        return Err(ServiceError::InvalidState("round already scored".into()));
    }

    let votes = store.list_votes(round_id).await?;
    let images = store.list_generated_images(round_id).await?;
    let mut owners = HashMap::with_capacity(images.len());
    for image in images {
        if let Some(prompt) = store.find_prompt(image.prompt_id).await? {
            owners.insert(image.id, prompt.player_id);
        }
    }

    let deltas = score(&votes, &owners, state.config().scoring);

    let claim = RoundPatch {
        scored_at: Some(SystemTime::now()),
        ..RoundPatch::default()
    };
    if !store
        .patch_round(round_id, RoundGuard::NotScored, claim)
        .await?
    {
        return Err(ServiceError::InvalidState("round already scored".into()));
    }

    for (player_id, delta) in &deltas {
        if !store.patch_player_score(*player_id, *delta).await? {
            warn!(%round_id, %player_id, delta, "scored player no longer exists");
        }
    }

    info!(
        %round_id,
        votes = votes.len(),
        players = deltas.len(),
        "round scored"
    );
    sse_events::broadcast_round_scored(state, round.game_id, round_id, &deltas).await;
    Ok(deltas)
}
