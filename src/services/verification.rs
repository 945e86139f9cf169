use std::{collections::HashSet, time::SystemTime};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{RoundGuard, RoundPatch, RoundStatus},
    error::ServiceError,
    scheduler::ScheduledAction,
    services::generation,
    state::SharedState,
};

/// Wait for the round's prompts to be readable, then hand them to the dispatcher once.
///
/// Prompts written right before the phase closed may not be visible yet, so an empty
/// read is retried with a linear backoff (`(attempt + 1) * base_delay`). When retries are
/// exhausted the round keeps moving on its phase timer with no images.
pub async fn verify_and_dispatch(
    state: &SharedState,
    round_id: Uuid,
    attempt: u32,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let Some(round) = store.find_round(round_id).await? else {
        debug!(%round_id, "verification skipped: round no longer exists");
        return Ok(());
    };
    if round.status == RoundStatus::Complete || round.generation_dispatched_at.is_some() {
        debug!(%round_id, status = round.status.as_str(), "verification skipped");
        return Ok(());
    }

    let prompts = store.list_prompts(round_id).await?;
    if !prompts.is_empty() {
        let claim = RoundPatch {
            generation_dispatched_at: Some(SystemTime::now()),
            ..RoundPatch::default()
        };
        if !store
            .patch_round(round_id, RoundGuard::NotDispatched, claim)
            .await?
        {
            debug!(%round_id, "prompts already dispatched by a concurrent delivery");
            return Ok(());
        }

        info!(%round_id, attempt, prompts = prompts.len(), "prompts verified");
        if let Err(err) =
            generation::generate(state, round_id, &round.question_text, prompts, None).await
        {
            error!(%round_id, error = %err, "image generation interrupted; resuming later");
            let interrupted = RoundPatch {
                generation_error: Some(format!("image generation interrupted: {err}")),
                ..RoundPatch::default()
            };
            if let Err(patch_err) = store.patch_round(round_id, RoundGuard::Any, interrupted).await
            {
                warn!(%round_id, error = %patch_err, "failed to record generation interruption");
            }
            state.schedule_after(
                state.config().verification.base_delay,
                ScheduledAction::ResumeDispatch { round_id },
            );
        }
        return Ok(());
    }

    let retry = state.config().verification;
    if attempt < retry.max_retries {
        let delay = retry.base_delay * (attempt + 1);
        debug!(%round_id, attempt, ?delay, "no prompts visible yet; retrying");
        state.schedule_after(
            delay,
            ScheduledAction::VerifyAndDispatch {
                round_id,
                attempt: attempt + 1,
            },
        );
        return Ok(());
    }

    let message = format!("no prompts found after {} attempts", attempt + 1);
    warn!(%round_id, "{message}");
    store
        .patch_round(
            round_id,
            RoundGuard::Any,
            RoundPatch {
                generation_error: Some(message),
                ..RoundPatch::default()
            },
        )
        .await?;
    Ok(())
}

/// Finish a dispatch that stopped before every prompt had its generated-image row.
///
/// Only prompts without a row are sent again. Rounds past voting are left alone since their
/// images were already read for scoring.
pub async fn resume_dispatch(state: &SharedState, round_id: Uuid) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let Some(round) = store.find_round(round_id).await? else {
        debug!(%round_id, "resume skipped: round no longer exists");
        return Ok(());
    };
    let open = matches!(round.status, RoundStatus::Generating | RoundStatus::Voting);
    if !open || round.generation_dispatched_at.is_none() || round.generation_completed_at.is_some()
    {
        debug!(%round_id, status = round.status.as_str(), "resume skipped");
        return Ok(());
    }

    let answered: HashSet<Uuid> = store
        .list_generated_images(round_id)
        .await?
        .into_iter()
        .map(|image| image.prompt_id)
        .collect();
    let missing: Vec<_> = store
        .list_prompts(round_id)
        .await?
        .into_iter()
        .filter(|prompt| !answered.contains(&prompt.id))
        .collect();

    if missing.is_empty() {
        if round.generation_error.is_none() {
            store
                .patch_round(
                    round_id,
                    RoundGuard::Any,
                    RoundPatch {
                        generation_completed_at: Some(SystemTime::now()),
                        ..RoundPatch::default()
                    },
                )
                .await?;
        }
        return Ok(());
    }

    info!(%round_id, prompts = missing.len(), "resuming image generation");
    generation::generate(state, round_id, &round.question_text, missing, None).await
}
