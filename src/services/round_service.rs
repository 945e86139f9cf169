use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        GameEntity, GameStatus, PlayerEntity, RoundEntity, RoundGuard, RoundStatus,
    },
    dto::game::{GameSummary, StartGameRequest},
    error::ServiceError,
    scheduler::ScheduledAction,
    services::{scoring, sse_events},
    state::{
        SharedState,
        round_machine::{self, PhaseEffect},
    },
};

const SCORING_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Create a game with its players and open its first round.
pub async fn start_game(
    state: &SharedState,
    request: StartGameRequest,
) -> Result<GameSummary, ServiceError> {
    request.validate()?;
    let config = state.config();
    let total_rounds = request.total_rounds.unwrap_or(config.default_total_rounds);
    if total_rounds > config.max_total_rounds {
        return Err(ServiceError::InvalidInput(format!(
            "a game can have at most {} rounds",
            config.max_total_rounds
        )));
    }

    let store = state.require_game_store().await?;
    let now = SystemTime::now();
    let game = GameEntity {
        id: Uuid::new_v4(),
        name: request.name.trim().to_owned(),
        total_rounds,
        status: GameStatus::Active,
        created_at: now,
        ended_at: None,
    };
    store.insert_game(game.clone()).await?;

    let mut players = Vec::with_capacity(request.players.len());
    for name in request.players {
        let player = PlayerEntity {
            id: Uuid::new_v4(),
            game_id: game.id,
            name: name.trim().to_owned(),
            score: 0,
        };
        store.insert_player(player.clone()).await?;
        players.push(player);
    }

    let round = new_round(state, game.id, 1, &[], now);
    if !store.insert_round(round.clone()).await? {
        return Err(ServiceError::InvalidState(format!(
            "game `{}` already has a first round",
            game.id
        )));
    }
    info!(
        game_id = %game.id,
        players = players.len(),
        total_rounds,
        "game started"
    );
    open_round(state, &round);

    Ok(GameSummary::build(game, players, &[round]))
}

/// Move a round out of `expected` into its next status.
///
/// Timer deliveries may be duplicated or arrive after the round already moved on: a round
/// that is missing, complete, or no longer in `expected` is left untouched. The status change
/// is committed with a compare-and-set so only one delivery ever applies it.
///
/// Reads that can fail happen before the commit: a results round is scored before it may
/// complete, and the follow-up of a completing round is resolved up front. A storage error
/// therefore leaves the round where it was for the next delivery.
pub async fn advance_phase(
    state: &SharedState,
    round_id: Uuid,
    expected: RoundStatus,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let Some(round) = store.find_round(round_id).await? else {
        debug!(%round_id, "phase timer fired for unknown round");
        return Ok(());
    };
    if round.status != expected || round.status == RoundStatus::Complete {
        debug!(
            %round_id,
            expected = expected.as_str(),
            actual = round.status.as_str(),
            "stale phase timer ignored"
        );
        return Ok(());
    }

    if round.status == RoundStatus::Results && round.scored_at.is_none() {
        ensure_scored(state, round_id).await?;
    }

    let plan = round_machine::plan(&round, SystemTime::now(), state.config())?;
    let follow_up_delay = plan.effects.iter().find_map(|effect| match effect {
        PhaseEffect::ScheduleFollowUp { delay } => Some(*delay),
        _ => None,
    });
    let mut follow_up = match follow_up_delay {
        Some(delay) => follow_up_action(state, &round)
            .await?
            .map(|action| (delay, action)),
        None => None,
    };

    if !store
        .patch_round(round_id, RoundGuard::Status(plan.from), plan.patch.clone())
        .await?
    {
        debug!(%round_id, from = plan.from.as_str(), "round advanced concurrently");
        return Ok(());
    }

    let mut updated = round;
    plan.patch.apply_to(&mut updated);
    info!(
        %round_id,
        game_id = %updated.game_id,
        from = plan.from.as_str(),
        to = plan.to.as_str(),
        "round advanced"
    );
    sse_events::broadcast_phase_changed(state, &updated);

    for effect in plan.effects {
        match effect {
            PhaseEffect::ScheduleVerification { delay } => state.schedule_after(
                delay,
                ScheduledAction::VerifyAndDispatch {
                    round_id,
                    attempt: 0,
                },
            ),
            PhaseEffect::ApplyScoring => {
                if let Err(err) = ensure_scored(state, round_id).await {
                    error!(%round_id, error = %err, "failed to score round; retrying later");
                    state.schedule_after(
                        SCORING_RETRY_DELAY,
                        ScheduledAction::ScoreRound { round_id },
                    );
                }
            }
            PhaseEffect::ArmPhaseTimer { at } => state.schedule_at(
                at,
                ScheduledAction::AdvancePhase {
                    round_id,
                    expected: plan.to,
                },
            ),
            PhaseEffect::ScheduleFollowUp { .. } => {
                if let Some((delay, action)) = follow_up.take() {
                    state.schedule_after(delay, action);
                }
            }
        }
    }

    Ok(())
}

/// Open round `round_number` of a game. Repeated calls create the round at most once.
pub async fn start_next_round(
    state: &SharedState,
    game_id: Uuid,
    round_number: u32,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let Some(game) = store.find_game(game_id).await? else {
        debug!(%game_id, "next round requested for unknown game");
        return Ok(());
    };
    if game.status != GameStatus::Active {
        debug!(%game_id, "next round requested for ended game");
        return Ok(());
    }
    if round_number > game.total_rounds {
        return end_game(state, game_id).await;
    }

    if let Some(open) = store.find_current_round(game_id).await? {
        if open.round_number != round_number {
            warn!(
                %game_id,
                round_number,
                open_round = open.round_number,
                "refusing to open a round while another one is still running"
            );
        }
        return Ok(());
    }
    let rounds = store.list_rounds(game_id).await?;
    if rounds.iter().any(|round| round.round_number == round_number) {
        debug!(%game_id, round_number, "round already exists");
        return Ok(());
    }

    let used: Vec<String> = rounds.into_iter().map(|round| round.question_text).collect();
    let round = new_round(state, game_id, round_number, &used, SystemTime::now());
    if !store.insert_round(round.clone()).await? {
        debug!(%game_id, round_number, "round created concurrently");
        return Ok(());
    }
    info!(%game_id, round_id = %round.id, round_number, "round started");
    open_round(state, &round);
    Ok(())
}

/// Mark a game as ended. Only the first call broadcasts the final scoreboard.
pub async fn end_game(state: &SharedState, game_id: Uuid) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    if !store.finish_game(game_id, SystemTime::now()).await? {
        debug!(%game_id, "game already ended or unknown");
        return Ok(());
    }
    info!(%game_id, "game ended");
    sse_events::broadcast_game_ended(state, game_id).await;
    Ok(())
}

/// Re-arm the timers of every active game after a restart or a storage reconnection.
///
/// Timers only live in memory, so the persisted rounds are the source of truth: open rounds
/// get their phase timer back (firing immediately when the deadline already passed), rounds
/// stuck in results without scores get scored, dispatches that stopped halfway are resumed,
/// and games whose last round completed get their follow-up.
pub async fn recover(state: &SharedState) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let games = store.list_active_games().await?;
    let mut rearmed = 0usize;

    for game in games {
        let rounds = store.list_rounds(game.id).await?;
        let Some(latest) = rounds.iter().max_by_key(|round| round.round_number) else {
            // The first round never made it to storage.
            state.schedule_after(
                Duration::ZERO,
                ScheduledAction::StartNextRound {
                    game_id: game.id,
                    round_number: 1,
                },
            );
            rearmed += 1;
            continue;
        };

        match latest.status {
            RoundStatus::Complete => {
                if let Some(action) = follow_up_action(state, latest).await? {
                    state.schedule_after(Duration::ZERO, action);
                }
            }
            status => {
                if status == RoundStatus::Results && latest.scored_at.is_none() {
                    if let Err(err) = ensure_scored(state, latest.id).await {
                        error!(
                            round_id = %latest.id,
                            error = %err,
                            "failed to score recovered round"
                        );
                        state.schedule_after(
                            SCORING_RETRY_DELAY,
                            ScheduledAction::ScoreRound { round_id: latest.id },
                        );
                    }
                }
                let accepts_images =
                    matches!(status, RoundStatus::Generating | RoundStatus::Voting);
                if status == RoundStatus::Generating && latest.generation_dispatched_at.is_none()
                {
                    state.schedule_after(
                        Duration::ZERO,
                        ScheduledAction::VerifyAndDispatch {
                            round_id: latest.id,
                            attempt: 0,
                        },
                    );
                } else if accepts_images
                    && latest.generation_dispatched_at.is_some()
                    && latest.generation_completed_at.is_none()
                {
                    state.schedule_after(
                        Duration::ZERO,
                        ScheduledAction::ResumeDispatch { round_id: latest.id },
                    );
                }
                state.schedule_at(
                    latest.phase_deadline,
                    ScheduledAction::AdvancePhase {
                        round_id: latest.id,
                        expected: status,
                    },
                );
            }
        }
        rearmed += 1;
    }

    info!(games = rearmed, "round timers recovered");
    Ok(())
}

/// Score a round unless it already is. A concurrent scorer winning the claim counts as done.
pub async fn ensure_scored(state: &SharedState, round_id: Uuid) -> Result<(), ServiceError> {
    match scoring::apply_round_scores(state, round_id).await {
        Ok(_) => Ok(()),
        Err(ServiceError::InvalidState(_)) => {
            debug!(%round_id, "round already scored");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// The action that follows `round` once it completes: the next round or the end of the game.
async fn follow_up_action(
    state: &SharedState,
    round: &RoundEntity,
) -> Result<Option<ScheduledAction>, ServiceError> {
    let store = state.require_game_store().await?;
    let Some(game) = store.find_game(round.game_id).await? else {
        warn!(game_id = %round.game_id, "completed round belongs to an unknown game");
        return Ok(None);
    };

    Ok(Some(if round.round_number < game.total_rounds {
        ScheduledAction::StartNextRound {
            game_id: game.id,
            round_number: round.round_number + 1,
        }
    } else {
        ScheduledAction::EndGame { game_id: game.id }
    }))
}

fn new_round(
    state: &SharedState,
    game_id: Uuid,
    round_number: u32,
    used_questions: &[String],
    now: SystemTime,
) -> RoundEntity {
    RoundEntity {
        id: Uuid::new_v4(),
        game_id,
        round_number,
        status: RoundStatus::Prompt,
        phase_deadline: now + state.config().phases.prompt,
        question_text: state.config().pick_question(used_questions),
        created_at: now,
        status_changed_at: now,
        generation_started_at: None,
        generation_dispatched_at: None,
        generation_completed_at: None,
        generation_error: None,
        scored_at: None,
        ended_at: None,
    }
}

fn open_round(state: &SharedState, round: &RoundEntity) {
    sse_events::broadcast_phase_changed(state, round);
    state.schedule_at(
        round.phase_deadline,
        ScheduledAction::AdvancePhase {
            round_id: round.id,
            expected: RoundStatus::Prompt,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{game_store::GameStore, models::RoundPatch},
        error::ServiceError,
        services::{generation::ProviderRegistry, verification},
        test_support::{TestHarness, seed_round, seed_round_with_prompts, seed_success_images},
    };

    fn request(players: &[&str], total_rounds: Option<u32>) -> StartGameRequest {
        StartGameRequest {
            name: "living room".into(),
            players: players.iter().map(|name| name.to_string()).collect(),
            total_rounds,
        }
    }

    #[tokio::test]
    async fn start_game_opens_first_round_and_arms_its_timer() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let mut events = harness.state.public_sse().subscribe();

        let summary = start_game(&harness.state, request(&["ann", "bob"], Some(2)))
            .await
            .unwrap();

        assert_eq!(summary.total_rounds, 2);
        assert_eq!(summary.players.len(), 2);
        let current = summary.current_round.expect("first round");
        assert_eq!(current.round_number, 1);

        let round = harness.store.find_round(current.id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Prompt);
        let scheduled = harness.scheduler.drain();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].at, Some(round.phase_deadline));
        assert_eq!(
            scheduled[0].action,
            ScheduledAction::AdvancePhase {
                round_id: round.id,
                expected: RoundStatus::Prompt,
            }
        );
        let event = events.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some(sse_events::EVENT_PHASE_CHANGED));
    }

    #[tokio::test]
    async fn start_game_rejects_invalid_requests() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let max = harness.state.config().max_total_rounds;

        let err = start_game(&harness.state, request(&["ann", "bob"], Some(max + 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = start_game(&harness.state, request(&["ann"], None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(harness.scheduler.drain().is_empty());
    }

    #[tokio::test]
    async fn prompt_deadline_moves_round_to_generating() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Prompt, &["ann", "bob"]).await;

        advance_phase(&harness.state, round.id, RoundStatus::Prompt)
            .await
            .unwrap();

        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Generating);
        assert!(stored.generation_started_at.is_some());

        let actions: Vec<ScheduledAction> = harness
            .scheduler
            .drain()
            .into_iter()
            .map(|call| call.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                ScheduledAction::VerifyAndDispatch {
                    round_id: round.id,
                    attempt: 0,
                },
                ScheduledAction::AdvancePhase {
                    round_id: round.id,
                    expected: RoundStatus::Generating,
                },
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_and_stale_timers_are_ignored() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Voting, &["ann", "bob"]).await;
        let mut events = harness.state.public_sse().subscribe();

        advance_phase(&harness.state, round.id, RoundStatus::Prompt)
            .await
            .unwrap();
        assert!(harness.scheduler.drain().is_empty());

        advance_phase(&harness.state, round.id, RoundStatus::Voting)
            .await
            .unwrap();
        advance_phase(&harness.state, round.id, RoundStatus::Voting)
            .await
            .unwrap();

        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Results);
        assert!(stored.scored_at.is_some());
        assert_eq!(harness.scheduler.drain().len(), 1);

        let names: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| event.event)
            .collect();
        assert_eq!(
            names
                .iter()
                .filter(|name| *name == sse_events::EVENT_PHASE_CHANGED)
                .count(),
            1
        );
        assert!(names.iter().any(|name| name == sse_events::EVENT_ROUND_SCORED));
    }

    #[tokio::test]
    async fn completing_a_round_schedules_the_next_one_or_the_end() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Results, &["ann", "bob"]).await;
        let grace = harness.state.config().next_round_grace;

        advance_phase(&harness.state, round.id, RoundStatus::Results)
            .await
            .unwrap();

        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Complete);
        assert!(stored.ended_at.is_some());
        let scheduled = harness.scheduler.drain();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].delay, Some(grace));
        let game = harness.store.find_game(round.game_id).await.unwrap().unwrap();
        let expected = if round.round_number < game.total_rounds {
            ScheduledAction::StartNextRound {
                game_id: game.id,
                round_number: round.round_number + 1,
            }
        } else {
            ScheduledAction::EndGame { game_id: game.id }
        };
        assert_eq!(scheduled[0].action, expected);
    }

    #[tokio::test]
    async fn next_round_is_created_once() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let summary = start_game(&harness.state, request(&["ann", "bob"], Some(2)))
            .await
            .unwrap();
        harness.scheduler.drain();
        let first = summary.current_round.unwrap();

        // Round 1 is still running.
        start_next_round(&harness.state, summary.id, 2).await.unwrap();
        assert_eq!(harness.store.list_rounds(summary.id).await.unwrap().len(), 1);

        for expected in [
            RoundStatus::Prompt,
            RoundStatus::Generating,
            RoundStatus::Voting,
            RoundStatus::Results,
        ] {
            advance_phase(&harness.state, first.id, expected).await.unwrap();
        }
        harness.scheduler.drain();

        start_next_round(&harness.state, summary.id, 2).await.unwrap();
        start_next_round(&harness.state, summary.id, 2).await.unwrap();

        let rounds = harness.store.list_rounds(summary.id).await.unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1].round_number, 2);
        assert_eq!(rounds[1].status, RoundStatus::Prompt);
        assert_eq!(harness.scheduler.drain().len(), 1);

        // Past the configured number of rounds the game ends instead.
        start_next_round(&harness.state, summary.id, 3).await.unwrap();
        let game = harness.store.find_game(summary.id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Ended);
    }

    #[tokio::test]
    async fn end_game_broadcasts_once() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Complete, &["ann", "bob"]).await;
        let mut events = harness.state.public_sse().subscribe();

        end_game(&harness.state, round.game_id).await.unwrap();
        end_game(&harness.state, round.game_id).await.unwrap();

        let ended = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| event.event.as_deref() == Some(sse_events::EVENT_GAME_ENDED))
            .count();
        assert_eq!(ended, 1);
        let game = harness.store.find_game(round.game_id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Ended);
        assert!(game.ended_at.is_some());
    }

    #[tokio::test]
    async fn recover_rearms_open_rounds_at_their_deadline() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Voting, &["ann", "bob"]).await;

        recover(&harness.state).await.unwrap();

        let scheduled = harness.scheduler.drain();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].at, Some(round.phase_deadline));
        assert_eq!(
            scheduled[0].action,
            ScheduledAction::AdvancePhase {
                round_id: round.id,
                expected: RoundStatus::Voting,
            }
        );
    }

    #[tokio::test]
    async fn recover_scores_results_round_left_unscored() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Results, &["ann", "bob"]).await;

        recover(&harness.state).await.unwrap();

        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert!(stored.scored_at.is_some());
    }

    /// Each of the two players votes for the other one's image.
    async fn seed_crossed_votes(harness: &TestHarness, status: RoundStatus) -> RoundEntity {
        let (round, prompts) = seed_round_with_prompts(harness, status, &["cat", "dog"]).await;
        let images = seed_success_images(harness, &prompts).await;
        for (voter, image) in [(&prompts[0], &images[1]), (&prompts[1], &images[0])] {
            harness
                .store
                .upsert_vote(round.id, voter.player_id, image.id, SystemTime::now())
                .await
                .unwrap();
        }
        round
    }

    async fn scores(harness: &TestHarness, game_id: Uuid) -> Vec<u32> {
        let players = harness.store.list_players(game_id).await.unwrap();
        players.into_iter().map(|player| player.score).collect()
    }

    #[tokio::test]
    async fn failed_scoring_is_retried_before_the_round_completes() {
        let (harness, flaky) = TestHarness::flaky(ProviderRegistry::placeholder()).await;
        let round = seed_crossed_votes(&harness, RoundStatus::Voting).await;
        let points = harness.state.config().scoring;
        flaky.fail_next("list_votes", 1);

        advance_phase(&harness.state, round.id, RoundStatus::Voting)
            .await
            .unwrap();
        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Results);
        assert!(stored.scored_at.is_none());
        let actions: Vec<ScheduledAction> = harness
            .scheduler
            .drain()
            .into_iter()
            .map(|call| call.action)
            .collect();
        assert!(actions.contains(&ScheduledAction::ScoreRound { round_id: round.id }));

        // A redelivered voting timer is stale; the results deadline still scores the round.
        advance_phase(&harness.state, round.id, RoundStatus::Voting)
            .await
            .unwrap();
        advance_phase(&harness.state, round.id, RoundStatus::Results)
            .await
            .unwrap();

        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Complete);
        assert!(stored.scored_at.is_some());
        let expected = points.points_per_win / 2 + points.points_per_vote;
        assert_eq!(scores(&harness, round.game_id).await, vec![expected, expected]);
    }

    #[tokio::test]
    async fn results_round_stays_open_while_it_cannot_be_scored() {
        let (harness, flaky) = TestHarness::flaky(ProviderRegistry::placeholder()).await;
        let round = seed_crossed_votes(&harness, RoundStatus::Results).await;
        flaky.fail_next("list_votes", 1);

        let err = advance_phase(&harness.state, round.id, RoundStatus::Results)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Results);
        assert!(harness.scheduler.drain().is_empty());

        advance_phase(&harness.state, round.id, RoundStatus::Results)
            .await
            .unwrap();
        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Complete);
        assert!(stored.scored_at.is_some());
        assert!(scores(&harness, round.game_id).await.iter().all(|score| *score > 0));
    }

    #[tokio::test]
    async fn follow_up_is_resolved_before_completing_the_round() {
        let (harness, flaky) = TestHarness::flaky(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Results, &["ann", "bob"]).await;
        let scored = RoundPatch {
            scored_at: Some(SystemTime::now()),
            ..RoundPatch::default()
        };
        harness
            .store
            .patch_round(round.id, RoundGuard::NotScored, scored)
            .await
            .unwrap();
        flaky.fail_next("find_game", 1);

        assert!(
            advance_phase(&harness.state, round.id, RoundStatus::Results)
                .await
                .is_err()
        );
        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Results);
        assert!(harness.scheduler.drain().is_empty());

        advance_phase(&harness.state, round.id, RoundStatus::Results)
            .await
            .unwrap();
        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Complete);
        let scheduled = harness.scheduler.drain();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(
            scheduled[0].action,
            ScheduledAction::StartNextRound {
                game_id: round.game_id,
                round_number: 2,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recover_resumes_an_interrupted_dispatch() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, prompts) =
            seed_round_with_prompts(&harness, RoundStatus::Generating, &["cat", "dog"]).await;
        let claim = RoundPatch {
            generation_dispatched_at: Some(SystemTime::now()),
            ..RoundPatch::default()
        };
        harness
            .store
            .patch_round(round.id, RoundGuard::NotDispatched, claim)
            .await
            .unwrap();
        seed_success_images(&harness, &prompts[..1]).await;

        recover(&harness.state).await.unwrap();

        let actions: Vec<ScheduledAction> = harness
            .scheduler
            .drain()
            .into_iter()
            .map(|call| call.action)
            .collect();
        assert!(actions.contains(&ScheduledAction::ResumeDispatch { round_id: round.id }));

        verification::resume_dispatch(&harness.state, round.id)
            .await
            .unwrap();
        let images = harness.store.list_generated_images(round.id).await.unwrap();
        assert_eq!(images.len(), 2);
        let first = images
            .iter()
            .find(|image| image.prompt_id == prompts[0].id)
            .unwrap();
        assert_eq!(first.metadata.provider, "test");
        let stored = harness.store.find_round(round.id).await.unwrap().unwrap();
        assert!(stored.generation_completed_at.is_some());
    }
}
