use std::time::Duration;

use tokio::{sync::mpsc, time::sleep};
use tracing::{error, warn};

use super::ScheduledAction;
use crate::{
    error::ServiceError,
    services::{round_service, verification},
    state::SharedState,
};

const MAX_DELIVERIES: u32 = 3;
const INITIAL_REDELIVERY_DELAY: Duration = Duration::from_millis(500);

/// Consume due actions until every scheduler handle is dropped.
///
/// Each action runs on its own task, so a slow dispatch never holds up the phase clock
/// of another round.
pub async fn run_worker(state: SharedState, mut rx: mpsc::UnboundedReceiver<ScheduledAction>) {
    while let Some(action) = rx.recv().await {
        let state = state.clone();
        tokio::spawn(async move { deliver(&state, action).await });
    }
}

/// Deliver an action, redelivering with backoff when its handler fails.
async fn deliver(state: &SharedState, action: ScheduledAction) {
    let mut delay = INITIAL_REDELIVERY_DELAY;
    for delivery in 1..=MAX_DELIVERIES {
        match execute(state, action).await {
            Ok(()) => return,
            Err(err) if delivery < MAX_DELIVERIES => {
                warn!(
                    action = action.name(),
                    delivery,
                    error = %err,
                    "scheduled action failed; redelivering"
                );
                sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                error!(
                    action = ?action,
                    deliveries = MAX_DELIVERIES,
                    error = %err,
                    "scheduled action failed permanently"
                );
            }
        }
    }
}

/// Route an action to the service that handles it.
pub async fn execute(state: &SharedState, action: ScheduledAction) -> Result<(), ServiceError> {
    match action {
        ScheduledAction::AdvancePhase { round_id, expected } => {
            round_service::advance_phase(state, round_id, expected).await
        }
        ScheduledAction::VerifyAndDispatch { round_id, attempt } => {
            verification::verify_and_dispatch(state, round_id, attempt).await
        }
        ScheduledAction::ResumeDispatch { round_id } => {
            verification::resume_dispatch(state, round_id).await
        }
        ScheduledAction::ScoreRound { round_id } => {
            round_service::ensure_scored(state, round_id).await
        }
        ScheduledAction::StartNextRound {
            game_id,
            round_number,
        } => round_service::start_next_round(state, game_id, round_number).await,
        ScheduledAction::EndGame { game_id } => round_service::end_game(state, game_id).await,
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::{GameStore, memory::MemoryGameStore},
            models::{GameStatus, RoundStatus},
        },
        dto::{game::StartGameRequest, round::{CastVoteRequest, SubmitPromptRequest}},
        scheduler::TokioScheduler,
        services::{generation::ProviderRegistry, submission_service},
        state::AppState,
    };

    fn quick_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.phases.prompt = Duration::from_secs(1);
        config.phases.generation = Duration::from_secs(2);
        config.phases.voting = Duration::from_secs(1);
        config.phases.results = Duration::from_secs(1);
        config.verification.initial_delay = Duration::from_millis(100);
        config.next_round_grace = Duration::from_millis(500);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn two_player_game_runs_on_its_timers() {
        let (timer, rx) = TokioScheduler::new();
        let state = AppState::new(quick_config(), Arc::new(timer), ProviderRegistry::placeholder());
        let store = MemoryGameStore::new();
        state.set_game_store(Arc::new(store.clone())).await;
        tokio::spawn(run_worker(state.clone(), rx));

        let summary = round_service::start_game(
            &state,
            StartGameRequest {
                name: "living room".into(),
                players: vec!["ann".into(), "bob".into()],
                total_rounds: Some(1),
            },
        )
        .await
        .unwrap();
        let round_id = summary.current_round.unwrap().id;
        let players = store.list_players(summary.id).await.unwrap();
        for (player, text) in players.iter().zip(["cat", "dog"]) {
            submission_service::submit_prompt(
                &state,
                round_id,
                SubmitPromptRequest {
                    player_id: player.id,
                    text: text.into(),
                },
            )
            .await
            .unwrap();
        }

        // t = 1.5s: prompt deadline passed and the verified prompts were dispatched.
        sleep(Duration::from_millis(1_500)).await;
        let round = store.find_round(round_id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Generating);
        assert!(round.generation_completed_at.is_some());
        let images = store.list_generated_images(round_id).await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|image| image.image_url().is_some()));

        // t = 3.5s: voting is open. Everyone votes for the other player's image.
        sleep(Duration::from_secs(2)).await;
        let round = store.find_round(round_id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Voting);
        let prompts = store.list_prompts(round_id).await.unwrap();
        for prompt in &prompts {
            let other = images
                .iter()
                .find(|image| image.prompt_id != prompt.id)
                .unwrap();
            submission_service::cast_vote(
                &state,
                round_id,
                CastVoteRequest {
                    voter_id: prompt.player_id,
                    image_id: other.id,
                },
            )
            .await
            .unwrap();
        }

        // t = 4.5s: results are shown and the tie was split.
        sleep(Duration::from_secs(1)).await;
        let round = store.find_round(round_id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Results);
        assert!(round.scored_at.is_some());
        let points = state.config().scoring;
        let expected = points.points_per_win / 2 + points.points_per_vote;
        let players = store.list_players(summary.id).await.unwrap();
        assert!(players.iter().all(|player| player.score == expected));

        // t = 6.5s: the round completed and the single-round game ended after the grace period.
        sleep(Duration::from_secs(2)).await;
        let round = store.find_round(round_id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Complete);
        let game = store.find_game(summary.id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Ended);
        assert_eq!(store.list_rounds(summary.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn score_round_action_scores_once() {
        use crate::test_support::{TestHarness, seed_round};

        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Results, &["ann", "bob"]).await;
        let action = ScheduledAction::ScoreRound { round_id: round.id };

        execute(&harness.state, action).await.unwrap();
        let scored_at = harness
            .store
            .find_round(round.id)
            .await
            .unwrap()
            .unwrap()
            .scored_at;
        assert!(scored_at.is_some());

        // A second delivery finds the round already scored and succeeds without rescoring.
        execute(&harness.state, action).await.unwrap();
        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.scored_at, scored_at);
    }
}
