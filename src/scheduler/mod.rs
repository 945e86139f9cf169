//! Delayed execution of the logical actions that drive rounds forward.
//!
//! Actions are plain data so they can be re-armed from persisted state after a restart
//! (see [`crate::services::round_service::recover`]).

mod worker;

use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::dao::models::RoundStatus;

pub use self::worker::{execute, run_worker};

/// A unit of work the scheduler runs at or after a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    /// End the current phase of a round, if it is still in `expected`.
    AdvancePhase {
        /// Round to advance.
        round_id: Uuid,
        /// Status the round was in when the timer was armed.
        expected: RoundStatus,
    },
    /// Check that prompts are visible and hand them to the dispatcher.
    VerifyAndDispatch {
        /// Round whose prompts are verified.
        round_id: Uuid,
        /// Zero-based verification attempt.
        attempt: u32,
    },
    /// Finish an interrupted dispatch by generating images for prompts that have none.
    ResumeDispatch {
        /// Round whose dispatch is resumed.
        round_id: Uuid,
    },
    /// Score a round whose inline scoring failed.
    ScoreRound {
        /// Round to score.
        round_id: Uuid,
    },
    /// Create round `round_number` of the game.
    StartNextRound {
        /// Game receiving the new round.
        game_id: Uuid,
        /// Number of the round to create.
        round_number: u32,
    },
    /// Mark the game as ended.
    EndGame {
        /// Game to end.
        game_id: Uuid,
    },
}

impl ScheduledAction {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ScheduledAction::AdvancePhase { .. } => "advance_phase",
            ScheduledAction::VerifyAndDispatch { .. } => "verify_and_dispatch",
            ScheduledAction::ResumeDispatch { .. } => "resume_dispatch",
            ScheduledAction::ScoreRound { .. } => "score_round",
            ScheduledAction::StartNextRound { .. } => "start_next_round",
            ScheduledAction::EndGame { .. } => "end_game",
        }
    }
}

/// "Run this action later" primitive the orchestrator depends on.
///
/// Delivery is at-least-once: every action handler must tolerate running twice.
pub trait Scheduler: Send + Sync {
    /// Run `action` once `delay` has elapsed.
    fn run_after(&self, delay: Duration, action: ScheduledAction);

    /// Run `action` at the wall-clock instant `at`, immediately if it already passed.
    fn run_at(&self, at: SystemTime, action: ScheduledAction) {
        let delay = at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        self.run_after(delay, action);
    }
}

/// Scheduler backed by tokio timers. Due actions are pushed to the worker channel.
#[derive(Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<ScheduledAction>,
}

impl TokioScheduler {
    /// Build the scheduler and the receiving end consumed by [`run_worker`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScheduledAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn run_after(&self, delay: Duration, action: ScheduledAction) {
        let tx = self.tx.clone();
        debug!(action = action.name(), delay_ms = delay.as_millis() as u64, "action scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(action).is_err() {
                debug!(action = action.name(), "scheduler worker gone; dropping action");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn actions_are_delivered_after_their_delay() {
        let (scheduler, mut rx) = TokioScheduler::new();
        let game_id = Uuid::new_v4();
        scheduler.run_after(Duration::from_secs(5), ScheduledAction::EndGame { game_id });
        scheduler.run_after(
            Duration::from_secs(1),
            ScheduledAction::StartNextRound {
                game_id,
                round_number: 2,
            },
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            ScheduledAction::StartNextRound {
                game_id,
                round_number: 2
            }
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(second, ScheduledAction::EndGame { game_id });
    }

    #[tokio::test(start_paused = true)]
    async fn past_instants_run_immediately() {
        let (scheduler, mut rx) = TokioScheduler::new();
        let game_id = Uuid::new_v4();
        scheduler.run_at(
            SystemTime::now() - Duration::from_secs(60),
            ScheduledAction::EndGame { game_id },
        );
        assert_eq!(rx.recv().await, Some(ScheduledAction::EndGame { game_id }));
    }
}
