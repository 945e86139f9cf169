//! Fixtures shared by the unit tests: an in-memory harness, a recording scheduler, a store
//! that fails on demand and a provider whose behaviour is scripted per prompt.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, memory::MemoryGameStore},
        models::{
            GameEntity, GameStatus, GeneratedImageEntity, GenerationMetadata, ImageOutcome,
            PlayerEntity, PromptEntity, RoundEntity, RoundGuard, RoundPatch, RoundStatus,
            VoteEntity,
        },
        storage::{StorageError, StorageResult},
    },
    scheduler::{ScheduledAction, Scheduler},
    services::generation::{GeneratedArtifact, GenerationProvider, ProviderError, ProviderRegistry},
    state::{AppState, SharedState},
};

/// One call made to [`RecordingScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScheduledCall {
    pub delay: Option<Duration>,
    pub at: Option<SystemTime>,
    pub action: ScheduledAction,
}

/// Scheduler that records actions instead of running them.
#[derive(Default)]
pub(crate) struct RecordingScheduler {
    calls: Mutex<Vec<ScheduledCall>>,
}

impl RecordingScheduler {
    /// Take every call recorded so far.
    pub fn drain(&self) -> Vec<ScheduledCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl Scheduler for RecordingScheduler {
    fn run_after(&self, delay: Duration, action: ScheduledAction) {
        self.calls.lock().unwrap().push(ScheduledCall {
            delay: Some(delay),
            at: None,
            action,
        });
    }

    fn run_at(&self, at: SystemTime, action: ScheduledAction) {
        self.calls.lock().unwrap().push(ScheduledCall {
            delay: None,
            at: Some(at),
            action,
        });
    }
}

/// Application state wired to an in-memory store and a recording scheduler.
pub(crate) struct TestHarness {
    pub state: SharedState,
    pub store: MemoryGameStore,
    pub scheduler: Arc<RecordingScheduler>,
}

impl TestHarness {
    pub async fn new(providers: ProviderRegistry) -> Self {
        Self::with_config(AppConfig::default(), providers).await
    }

    pub async fn with_config(config: AppConfig, providers: ProviderRegistry) -> Self {
        let scheduler = Arc::new(RecordingScheduler::default());
        let state = AppState::new(config, scheduler.clone(), providers);
        let store = MemoryGameStore::new();
        state.set_game_store(Arc::new(store.clone())).await;
        Self {
            state,
            store,
            scheduler,
        }
    }
}

impl TestHarness {
    /// Harness whose installed store fails on demand. `store` still reads the same data.
    pub async fn flaky(providers: ProviderRegistry) -> (Self, FlakyStore) {
        let harness = Self::new(providers).await;
        let flaky = FlakyStore::new(harness.store.clone());
        harness.state.set_game_store(Arc::new(flaky.clone())).await;
        (harness, flaky)
    }
}

/// [`MemoryGameStore`] wrapper failing the next calls of selected operations.
#[derive(Clone)]
pub(crate) struct FlakyStore {
    inner: MemoryGameStore,
    failures: Arc<DashMap<&'static str, u32>>,
}

impl FlakyStore {
    fn new(inner: MemoryGameStore) -> Self {
        Self {
            inner,
            failures: Arc::new(DashMap::new()),
        }
    }

    /// Make the next `times` calls of `operation` fail as unavailable.
    pub fn fail_next(&self, operation: &'static str, times: u32) {
        self.failures.insert(operation, times);
    }

    fn injected(&self, operation: &'static str) -> Option<StorageError> {
        let mut remaining = self.failures.get_mut(operation)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(StorageError::unavailable(
            format!("{operation} failed"),
            std::io::Error::other("injected failure"),
        ))
    }
}

macro_rules! flaky {
    ($store:ident, $operation:literal, $call:expr) => {
        match $store.injected($operation) {
            Some(err) => async move { Err(err) }.boxed(),
            None => $call,
        }
    };
}

impl GameStore for FlakyStore {
    fn insert_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        flaky!(self, "insert_game", self.inner.insert_game(game))
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        flaky!(self, "find_game", self.inner.find_game(id))
    }

    fn finish_game(&self, id: Uuid, at: SystemTime) -> BoxFuture<'static, StorageResult<bool>> {
        flaky!(self, "finish_game", self.inner.finish_game(id, at))
    }

    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        flaky!(self, "list_active_games", self.inner.list_active_games())
    }

    fn insert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        flaky!(self, "insert_player", self.inner.insert_player(player))
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        flaky!(self, "list_players", self.inner.list_players(game_id))
    }

    fn patch_player_score(
        &self,
        player_id: Uuid,
        delta: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        flaky!(self, "patch_player_score", self.inner.patch_player_score(player_id, delta))
    }

    fn insert_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<bool>> {
        flaky!(self, "insert_round", self.inner.insert_round(round))
    }

    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        flaky!(self, "find_round", self.inner.find_round(id))
    }

    fn find_current_round(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        flaky!(self, "find_current_round", self.inner.find_current_round(game_id))
    }

    fn list_rounds(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        flaky!(self, "list_rounds", self.inner.list_rounds(game_id))
    }

    fn patch_round(
        &self,
        id: Uuid,
        guard: RoundGuard,
        patch: RoundPatch,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        flaky!(self, "patch_round", self.inner.patch_round(id, guard, patch))
    }

    fn upsert_prompt(
        &self,
        round_id: Uuid,
        player_id: Uuid,
        text: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<PromptEntity>> {
        flaky!(
            self,
            "upsert_prompt",
            self.inner.upsert_prompt(round_id, player_id, text, at)
        )
    }

    fn find_prompt(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PromptEntity>>> {
        flaky!(self, "find_prompt", self.inner.find_prompt(id))
    }

    fn list_prompts(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PromptEntity>>> {
        flaky!(self, "list_prompts", self.inner.list_prompts(round_id))
    }

    fn upsert_vote(
        &self,
        round_id: Uuid,
        voter_id: Uuid,
        image_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<VoteEntity>> {
        flaky!(
            self,
            "upsert_vote",
            self.inner.upsert_vote(round_id, voter_id, image_id, at)
        )
    }

    fn list_votes(&self, round_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        flaky!(self, "list_votes", self.inner.list_votes(round_id))
    }

    fn insert_generated_image(
        &self,
        image: GeneratedImageEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        flaky!(
            self,
            "insert_generated_image",
            self.inner.insert_generated_image(image)
        )
    }

    fn find_generated_image(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GeneratedImageEntity>>> {
        flaky!(self, "find_generated_image", self.inner.find_generated_image(id))
    }

    fn list_generated_images(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GeneratedImageEntity>>> {
        flaky!(
            self,
            "list_generated_images",
            self.inner.list_generated_images(round_id)
        )
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        flaky!(self, "health_check", self.inner.health_check())
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        flaky!(self, "try_reconnect", self.inner.try_reconnect())
    }
}

/// Persist a three-round game with the given players and its first round in `status`.
pub(crate) async fn seed_round(
    harness: &TestHarness,
    status: RoundStatus,
    names: &[&str],
) -> (RoundEntity, Vec<PlayerEntity>) {
    let now = SystemTime::now();
    let game = GameEntity {
        id: Uuid::new_v4(),
        name: "test room".into(),
        total_rounds: 3,
        status: GameStatus::Active,
        created_at: now,
        ended_at: None,
    };
    harness.store.insert_game(game.clone()).await.unwrap();

    let mut players = Vec::with_capacity(names.len());
    for name in names {
        let player = PlayerEntity {
            id: Uuid::new_v4(),
            game_id: game.id,
            name: name.to_string(),
            score: 0,
        };
        harness.store.insert_player(player.clone()).await.unwrap();
        players.push(player);
    }

    let past_prompt = status != RoundStatus::Prompt;
    let round = RoundEntity {
        id: Uuid::new_v4(),
        game_id: game.id,
        round_number: 1,
        status,
        phase_deadline: now + Duration::from_secs(30),
        question_text: "What does a cat dream about?".into(),
        created_at: now,
        status_changed_at: now,
        generation_started_at: past_prompt.then_some(now),
        generation_dispatched_at: None,
        generation_completed_at: None,
        generation_error: None,
        scored_at: None,
        ended_at: (status == RoundStatus::Complete).then_some(now),
    };
    assert!(harness.store.insert_round(round.clone()).await.unwrap());
    (round, players)
}

/// Seed a round with one player per text, each having submitted that text, in order.
pub(crate) async fn seed_round_with_prompts(
    harness: &TestHarness,
    status: RoundStatus,
    texts: &[&str],
) -> (RoundEntity, Vec<PromptEntity>) {
    let names: Vec<String> = (0..texts.len()).map(|i| format!("player-{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let (round, players) = seed_round(harness, status, &names).await;

    let mut prompts = Vec::with_capacity(texts.len());
    for (player, text) in players.iter().zip(texts) {
        let prompt = harness
            .store
            .upsert_prompt(round.id, player.id, text.to_string(), SystemTime::now())
            .await
            .unwrap();
        prompts.push(prompt);
    }
    (round, prompts)
}

/// Record a successful image for every prompt, in order.
pub(crate) async fn seed_success_images(
    harness: &TestHarness,
    prompts: &[PromptEntity],
) -> Vec<GeneratedImageEntity> {
    let mut images = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let image = GeneratedImageEntity {
            id: Uuid::new_v4(),
            prompt_id: prompt.id,
            round_id: prompt.round_id,
            outcome: ImageOutcome::Success {
                image_url: format!("test://{}", prompt.text),
            },
            metadata: GenerationMetadata {
                provider: "test".into(),
                elapsed_ms: 0,
                fallback: false,
            },
            created_at: SystemTime::now(),
        };
        assert!(
            harness
                .store
                .insert_generated_image(image.clone())
                .await
                .unwrap()
        );
        images.push(image);
    }
    images
}

/// Counters shared between a [`ScriptedProvider`] and the test observing it.
#[derive(Clone, Default)]
pub(crate) struct CallLog {
    inner: Arc<CallCounters>,
}

#[derive(Default)]
struct CallCounters {
    total: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallLog {
    pub fn total(&self) -> usize {
        self.inner.total.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight {
        self.inner.total.fetch_add(1, Ordering::SeqCst);
        let current = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(current, Ordering::SeqCst);
        InFlight(self.inner.clone())
    }
}

struct InFlight(Arc<CallCounters>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Provider answering from a script: per-prompt failures, hung calls or a global outage.
pub(crate) struct ScriptedProvider {
    name: String,
    failures: HashMap<String, ProviderError>,
    hanging: HashSet<String>,
    fail_all: Option<ProviderError>,
    max_concurrent: Option<usize>,
    calls: CallLog,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            failures: HashMap::new(),
            hanging: HashSet::new(),
            fail_all: None,
            max_concurrent: None,
            calls: CallLog::default(),
        }
    }

    pub fn failing_on(mut self, prompt: &str, err: ProviderError) -> Self {
        self.failures.insert(prompt.to_owned(), err);
        self
    }

    pub fn hanging_on(mut self, prompt: &str) -> Self {
        self.hanging.insert(prompt.to_owned());
        self
    }

    pub fn failing_all(mut self, err: ProviderError) -> Self {
        self.fail_all = Some(err);
        self
    }

    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = Some(limit);
        self
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    fn generate(
        &self,
        prompt: String,
        _context: String,
    ) -> BoxFuture<'static, Result<GeneratedArtifact, ProviderError>> {
        let guard = self.calls.enter();
        let hangs = self.hanging.contains(&prompt);
        let outcome = match (&self.fail_all, self.failures.get(&prompt)) {
            (Some(err), _) | (None, Some(err)) => Err(err.clone()),
            (None, None) => Ok(GeneratedArtifact {
                image_url: format!("scripted://{}/{prompt}", self.name),
            }),
        };
        Box::pin(async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_millis(10)).await;
            if hangs {
                std::future::pending::<()>().await;
            }
            outcome
        })
    }
}
