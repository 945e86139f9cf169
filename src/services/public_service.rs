//! Read-only projections of games and rounds exposed to every client.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    dao::models::RoundStatus,
    dto::{
        format_system_time,
        game::GameSummary,
        round::{GenerationDiagnostics, ImageSummary, RoundSnapshot, VoteTally},
    },
    error::ServiceError,
    state::SharedState,
};

/// Return a game with its scoreboard and current round.
pub async fn get_game(state: &SharedState, id: Uuid) -> Result<GameSummary, ServiceError> {
    let store = state.require_game_store().await?;
    let game = store
        .find_game(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game `{id}` not found")))?;
    let players = store.list_players(id).await?;
    let rounds = store.list_rounds(id).await?;
    Ok(GameSummary::build(game, players, &rounds))
}

/// Return a round as players may see it in its current phase.
///
/// Images appear once voting opens; authors and vote tallies once results are shown.
pub async fn get_round(state: &SharedState, id: Uuid) -> Result<RoundSnapshot, ServiceError> {
    let store = state.require_game_store().await?;
    let round = store
        .find_round(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("round `{id}` not found")))?;
    let prompts = store.list_prompts(id).await?;

    let shows_images = matches!(
        round.status,
        RoundStatus::Voting | RoundStatus::Results | RoundStatus::Complete
    );
    let shows_results = matches!(round.status, RoundStatus::Results | RoundStatus::Complete);

    let (images, tallies) = if shows_images {
        let authors: HashMap<Uuid, Uuid> = prompts
            .iter()
            .map(|prompt| (prompt.id, prompt.player_id))
            .collect();
        let images = store.list_generated_images(id).await?;
        let summaries: Vec<ImageSummary> = images
            .iter()
            .map(|image| ImageSummary {
                id: image.id,
                image_url: image.image_url().map(str::to_owned),
                error: image.error().map(str::to_owned),
                author_id: shows_results
                    .then(|| authors.get(&image.prompt_id).copied())
                    .flatten(),
            })
            .collect();

        let tallies = if shows_results {
            let votes = store.list_votes(id).await?;
            let mut counts: HashMap<Uuid, u32> = HashMap::new();
            for vote in &votes {
                *counts.entry(vote.image_id).or_default() += 1;
            }
            let mut tallies: Vec<VoteTally> = images
                .iter()
                .map(|image| VoteTally {
                    image_id: image.id,
                    votes: counts.get(&image.id).copied().unwrap_or(0),
                })
                .collect();
            tallies.sort_by(|a, b| b.votes.cmp(&a.votes));
            Some(tallies)
        } else {
            None
        };
        (Some(summaries), tallies)
    } else {
        (None, None)
    };

    Ok(RoundSnapshot {
        id: round.id,
        game_id: round.game_id,
        round_number: round.round_number,
        status: round.status.into(),
        phase_deadline: format_system_time(round.phase_deadline),
        question: round.question_text,
        prompt_count: prompts.len(),
        images,
        tallies,
        generation: GenerationDiagnostics {
            started_at: round.generation_started_at.map(format_system_time),
            completed_at: round.generation_completed_at.map(format_system_time),
            error: round.generation_error,
        },
    })
}
