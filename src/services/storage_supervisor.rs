use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    services::{round_service, sse_service},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a storage backend connected, holding the shared state in degraded mode while it is not.
///
/// Every time the backend becomes usable again the round timers are rebuilt from storage,
/// since scheduled actions may have been dropped while requests were failing.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_game_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                resume(&state).await;
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded().await {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false).await;
                                resume(&state).await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(_) => {
                            if reconnect(&state, store.as_ref()).await {
                                state.update_degraded(false).await;
                                resume(&state).await;
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            }
                            warn!("exhausted storage reconnect attempts; staying in degraded mode");
                            break;
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn GameStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true).await;
                    sse_service::broadcast_public_info(
                        state.public_sse(),
                        "storage unavailable; rounds are paused",
                    );
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

async fn resume(state: &SharedState) {
    if let Err(err) = round_service::recover(state).await {
        error!(error = %err, "failed to recover round timers");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        dao::{
            game_store::memory::MemoryGameStore,
            models::RoundStatus,
        },
        scheduler::ScheduledAction,
        services::generation::ProviderRegistry,
        test_support::{TestHarness, seed_round},
    };

    #[tokio::test(start_paused = true)]
    async fn installs_store_after_failed_attempts_and_rearms_rounds() {
        let harness = TestHarness::new(ProviderRegistry::placeholder()).await;
        let (round, _) = seed_round(&harness, RoundStatus::Voting, &["ann", "bob"]).await;
        harness.state.update_degraded(true).await;
        assert!(harness.state.require_game_store().await.is_err());

        let attempts = Arc::new(AtomicU32::new(0));
        let store: MemoryGameStore = harness.store.clone();
        let counter = attempts.clone();
        let supervisor = tokio::spawn(run(harness.state.clone(), move || {
            let store = store.clone();
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StorageError::unavailable(
                        "refused".into(),
                        std::io::Error::other("connection refused"),
                    ))
                } else {
                    Ok(Arc::new(store) as Arc<dyn GameStore>)
                }
            }
        }));

        tokio::time::sleep(INITIAL_DELAY * 2).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!harness.state.is_degraded().await);
        let actions: Vec<ScheduledAction> = harness
            .scheduler
            .drain()
            .into_iter()
            .map(|call| call.action)
            .collect();
        assert!(actions.contains(&ScheduledAction::AdvancePhase {
            round_id: round.id,
            expected: RoundStatus::Voting,
        }));
        supervisor.abort();
    }
}
