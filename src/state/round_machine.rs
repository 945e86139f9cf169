use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::{
    config::AppConfig,
    dao::models::{RoundEntity, RoundPatch, RoundStatus},
};

/// Side effect to run once a transition has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEffect {
    /// Enqueue the verification loop (attempt 0) after `delay`.
    ScheduleVerification {
        /// Grace period for the last prompt writes to become visible.
        delay: Duration,
    },
    /// Turn the round's votes into points.
    ApplyScoring,
    /// Arm the timer that ends the phase that was just entered.
    ArmPhaseTimer {
        /// Absolute deadline of the new phase.
        at: SystemTime,
    },
    /// Start the next round or end the game once `delay` has elapsed.
    ScheduleFollowUp {
        /// Time left to clients to render the final scoreboard.
        delay: Duration,
    },
}

/// Error returned when a round has no phase after its current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: a round in {from:?} has no next phase")]
pub struct InvalidTransition {
    /// The status the round was in.
    pub from: RoundStatus,
}

/// A validated transition: the guarded patch to commit and the effects to run afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    /// Status the round must still be in when the patch is committed.
    pub from: RoundStatus,
    /// Status entered by the transition.
    pub to: RoundStatus,
    /// Fields written together with the status.
    pub patch: RoundPatch,
    /// Effects in execution order.
    pub effects: Vec<PhaseEffect>,
}

/// Next status along `Prompt -> Generating -> Voting -> Results -> Complete`.
pub fn next_status(from: RoundStatus) -> Result<RoundStatus, InvalidTransition> {
    match from {
        RoundStatus::Prompt => Ok(RoundStatus::Generating),
        RoundStatus::Generating => Ok(RoundStatus::Voting),
        RoundStatus::Voting => Ok(RoundStatus::Results),
        RoundStatus::Results => Ok(RoundStatus::Complete),
        RoundStatus::Complete => Err(InvalidTransition { from }),
    }
}

/// Plan the transition out of the round's persisted status at time `now`.
///
/// Pure: nothing is written and nothing is scheduled until the caller commits
/// [`PhasePlan::patch`] under a status guard on [`PhasePlan::from`].
pub fn plan(
    round: &RoundEntity,
    now: SystemTime,
    config: &AppConfig,
) -> Result<PhasePlan, InvalidTransition> {
    let from = round.status;
    let to = next_status(from)?;

    let mut patch = RoundPatch {
        status: Some(to),
        status_changed_at: Some(now),
        ..RoundPatch::default()
    };
    let mut effects = Vec::new();

    match to {
        RoundStatus::Generating => {
            patch.generation_started_at = Some(now);
            effects.push(PhaseEffect::ScheduleVerification {
                delay: config.verification.initial_delay,
            });
        }
        RoundStatus::Results => effects.push(PhaseEffect::ApplyScoring),
        RoundStatus::Complete => {
            patch.ended_at = Some(now);
            effects.push(PhaseEffect::ScheduleFollowUp {
                delay: config.next_round_grace,
            });
        }
        RoundStatus::Voting | RoundStatus::Prompt => {}
    }

    // Complete is untimed: its deadline is pinned to the moment it was entered.
    let deadline = match config.phases.for_status(to) {
        Some(duration) => {
            let at = now + duration;
            effects.push(PhaseEffect::ArmPhaseTimer { at });
            at
        }
        None => now,
    };
    patch.phase_deadline = Some(deadline);

    Ok(PhasePlan {
        from,
        to,
        patch,
        effects,
    })
}
