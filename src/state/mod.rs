/// Pure phase transition planning.
pub mod round_machine;
mod sse;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    error::ServiceError,
    scheduler::{ScheduledAction, Scheduler},
    services::generation::ProviderRegistry,
};

pub use self::sse::SseHub;

/// Reference-counted handle to the application state shared by handlers and tasks.
pub type SharedState = Arc<AppState>;

const PUBLIC_SSE_CAPACITY: usize = 64;

/// Central application state: storage handle, scheduler, providers and notification hub.
///
/// Holds no per-round data. Rounds are always re-read from the store so concurrent timer
/// deliveries and player requests agree on a single source of truth.
pub struct AppState {
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    scheduler: Arc<dyn Scheduler>,
    providers: ProviderRegistry,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        scheduler: Arc<dyn Scheduler>,
        providers: ProviderRegistry,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            game_store: RwLock::new(None),
            sse: SseHub::new(PUBLIC_SSE_CAPACITY),
            degraded: degraded_tx,
            config,
            scheduler,
            providers,
        })
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] while none is usable.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registered generation providers.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Shorthand for [`Scheduler::run_after`].
    pub fn schedule_after(&self, delay: std::time::Duration, action: ScheduledAction) {
        self.scheduler.run_after(delay, action);
    }

    /// Shorthand for [`Scheduler::run_at`].
    pub fn schedule_at(&self, at: std::time::SystemTime, action: ScheduledAction) {
        self.scheduler.run_at(at, action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::game_store::memory::MemoryGameStore, test_support::RecordingScheduler};

    #[tokio::test]
    async fn state_is_degraded_until_a_store_is_installed() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(RecordingScheduler::default()),
            ProviderRegistry::placeholder(),
        );
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_game_store().await,
            Err(ServiceError::Degraded)
        ));

        state.set_game_store(Arc::new(MemoryGameStore::new())).await;
        assert!(!state.is_degraded().await);
        assert!(state.require_game_store().await.is_ok());

        state.update_degraded(true).await;
        assert!(matches!(
            state.require_game_store().await,
            Err(ServiceError::Degraded)
        ));
    }
}
