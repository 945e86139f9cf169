//! In-process [`GameStore`] backed by concurrent hash maps.
//!
//! Used when no durable backend is configured and by the test-suite. Uniqueness constraints
//! are enforced with secondary key maps whose entry locks make every upsert atomic.

use std::{sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{
        GameEntity, GameStatus, GeneratedImageEntity, PlayerEntity, PromptEntity, RoundEntity,
        RoundGuard, RoundPatch, VoteEntity,
    },
    storage::StorageResult,
};

/// Store keeping every record in process memory. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    games: DashMap<Uuid, GameEntity>,
    players: DashMap<Uuid, PlayerEntity>,
    rounds: DashMap<Uuid, RoundEntity>,
    round_numbers: DashMap<(Uuid, u32), Uuid>,
    prompts: DashMap<Uuid, PromptEntity>,
    prompt_keys: DashMap<(Uuid, Uuid), Uuid>,
    votes: DashMap<Uuid, VoteEntity>,
    vote_keys: DashMap<(Uuid, Uuid), Uuid>,
    images: DashMap<Uuid, GeneratedImageEntity>,
    image_by_prompt: DashMap<Uuid, Uuid>,
}

impl MemoryGameStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    fn finish_game(&self, id: Uuid, at: SystemTime) -> bool {
        match self.games.get_mut(&id) {
            Some(mut game) if game.status == GameStatus::Active => {
                game.status = GameStatus::Ended;
                game.ended_at = Some(at);
                true
            }
            _ => false,
        }
    }

    fn patch_player_score(&self, player_id: Uuid, delta: u32) -> bool {
        match self.players.get_mut(&player_id) {
            Some(mut player) => {
                player.score = player.score.saturating_add(delta);
                true
            }
            None => false,
        }
    }

    fn insert_round(&self, round: RoundEntity) -> bool {
        match self.round_numbers.entry((round.game_id, round.round_number)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(round.id);
                self.rounds.insert(round.id, round);
                true
            }
        }
    }

    fn find_current_round(&self, game_id: Uuid) -> Option<RoundEntity> {
        self.rounds
            .iter()
            .filter(|entry| entry.game_id == game_id && entry.status.is_open())
            .max_by_key(|entry| entry.round_number)
            .map(|entry| entry.value().clone())
    }

    fn list_rounds(&self, game_id: Uuid) -> Vec<RoundEntity> {
        let mut rounds: Vec<RoundEntity> = self
            .rounds
            .iter()
            .filter(|entry| entry.game_id == game_id)
            .map(|entry| entry.value().clone())
            .collect();
        rounds.sort_by_key(|round| round.round_number);
        rounds
    }

    fn patch_round(&self, id: Uuid, guard: RoundGuard, patch: &RoundPatch) -> bool {
        match self.rounds.get_mut(&id) {
            Some(mut round) if guard.allows(&round) => {
                patch.apply_to(&mut round);
                true
            }
            _ => false,
        }
    }

    fn upsert_prompt(
        &self,
        round_id: Uuid,
        player_id: Uuid,
        text: String,
        at: SystemTime,
    ) -> PromptEntity {
        // The key entry stays locked until the prompt row is written.
        match self.prompt_keys.entry((round_id, player_id)) {
            Entry::Occupied(slot) => {
                let id = *slot.get();
                let mut prompt = self
                    .prompts
                    .entry(id)
                    .or_insert_with(|| PromptEntity {
                        id,
                        round_id,
                        player_id,
                        text: text.clone(),
                        submitted_at: at,
                    });
                prompt.text = text;
                prompt.submitted_at = at;
                prompt.clone()
            }
            Entry::Vacant(slot) => {
                let prompt = PromptEntity {
                    id: Uuid::new_v4(),
                    round_id,
                    player_id,
                    text,
                    submitted_at: at,
                };
                self.prompts.insert(prompt.id, prompt.clone());
                slot.insert(prompt.id);
                prompt
            }
        }
    }

    fn list_prompts(&self, round_id: Uuid) -> Vec<PromptEntity> {
        let mut prompts: Vec<PromptEntity> = self
            .prompts
            .iter()
            .filter(|entry| entry.round_id == round_id)
            .map(|entry| entry.value().clone())
            .collect();
        prompts.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        prompts
    }

    fn upsert_vote(
        &self,
        round_id: Uuid,
        voter_id: Uuid,
        image_id: Uuid,
        at: SystemTime,
    ) -> VoteEntity {
        match self.vote_keys.entry((round_id, voter_id)) {
            Entry::Occupied(slot) => {
                let id = *slot.get();
                let mut vote = self.votes.entry(id).or_insert_with(|| VoteEntity {
                    id,
                    round_id,
                    voter_id,
                    image_id,
                    cast_at: at,
                });
                vote.image_id = image_id;
                vote.cast_at = at;
                vote.clone()
            }
            Entry::Vacant(slot) => {
                let vote = VoteEntity {
                    id: Uuid::new_v4(),
                    round_id,
                    voter_id,
                    image_id,
                    cast_at: at,
                };
                self.votes.insert(vote.id, vote.clone());
                slot.insert(vote.id);
                vote
            }
        }
    }

    fn list_votes(&self, round_id: Uuid) -> Vec<VoteEntity> {
        let mut votes: Vec<VoteEntity> = self
            .votes
            .iter()
            .filter(|entry| entry.round_id == round_id)
            .map(|entry| entry.value().clone())
            .collect();
        votes.sort_by(|a, b| a.cast_at.cmp(&b.cast_at).then_with(|| a.id.cmp(&b.id)));
        votes
    }

    fn insert_generated_image(&self, image: GeneratedImageEntity) -> bool {
        match self.image_by_prompt.entry(image.prompt_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(image.id);
                self.images.insert(image.id, image);
                true
            }
        }
    }

    fn list_generated_images(&self, round_id: Uuid) -> Vec<GeneratedImageEntity> {
        let mut images: Vec<GeneratedImageEntity> = self
            .images
            .iter()
            .filter(|entry| entry.round_id == round_id)
            .map(|entry| entry.value().clone())
            .collect();
        images.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        images
    }
}

impl GameStore for MemoryGameStore {
    fn insert_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.games.insert(game.id, game);
            Ok(())
        })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.games.get(&id).map(|game| game.clone())) })
    }

    fn finish_game(&self, id: Uuid, at: SystemTime) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.finish_game(id, at)) })
    }

    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .games
                .iter()
                .filter(|entry| entry.status == GameStatus::Active)
                .map(|entry| entry.value().clone())
                .collect())
        })
    }

    fn insert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.players.insert(player.id, player);
            Ok(())
        })
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut players: Vec<PlayerEntity> = inner
                .players
                .iter()
                .filter(|entry| entry.game_id == game_id)
                .map(|entry| entry.value().clone())
                .collect();
            players.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            Ok(players)
        })
    }

    fn patch_player_score(
        &self,
        player_id: Uuid,
        delta: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.patch_player_score(player_id, delta)) })
    }

    fn insert_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.insert_round(round)) })
    }

    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.rounds.get(&id).map(|round| round.clone())) })
    }

    fn find_current_round(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.find_current_round(game_id)) })
    }

    fn list_rounds(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_rounds(game_id)) })
    }

    fn patch_round(
        &self,
        id: Uuid,
        guard: RoundGuard,
        patch: RoundPatch,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.patch_round(id, guard, &patch)) })
    }

    fn upsert_prompt(
        &self,
        round_id: Uuid,
        player_id: Uuid,
        text: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<PromptEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.upsert_prompt(round_id, player_id, text, at)) })
    }

    fn find_prompt(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PromptEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.prompts.get(&id).map(|prompt| prompt.clone())) })
    }

    fn list_prompts(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PromptEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_prompts(round_id)) })
    }

    fn upsert_vote(
        &self,
        round_id: Uuid,
        voter_id: Uuid,
        image_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<VoteEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.upsert_vote(round_id, voter_id, image_id, at)) })
    }

    fn list_votes(&self, round_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_votes(round_id)) })
    }

    fn insert_generated_image(
        &self,
        image: GeneratedImageEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.insert_generated_image(image)) })
    }

    fn find_generated_image(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GeneratedImageEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.images.get(&id).map(|image| image.clone())) })
    }

    fn list_generated_images(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GeneratedImageEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.list_generated_images(round_id)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
