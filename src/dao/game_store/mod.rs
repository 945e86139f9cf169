/// In-process store.
pub mod memory;
#[cfg(feature = "mongo-store")]
/// MongoDB store.
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    GameEntity, GeneratedImageEntity, PlayerEntity, PromptEntity, RoundEntity, RoundGuard,
    RoundPatch, VoteEntity,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for games, rounds and their submissions.
///
/// Every mutation that backs an invariant (one prompt per player and round, one vote per
/// voter and round, one image per prompt, forward-only status changes) is atomic in the
/// backend so callers never need an application-level lock.
pub trait GameStore: Send + Sync {
    /// Persist a new game.
    fn insert_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a game by id.
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Move an active game to ended. Returns `false` when it was not active.
    fn finish_game(&self, id: Uuid, at: SystemTime) -> BoxFuture<'static, StorageResult<bool>>;
    /// Games that have not ended yet.
    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>>;

    /// Persist a new player.
    fn insert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Players of the game.
    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Add `delta` to the cumulative score. Returns `false` for an unknown player.
    fn patch_player_score(
        &self,
        player_id: Uuid,
        delta: u32,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Insert a round. Returns `false` when the game already has a round with that number.
    fn insert_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Fetch a round by id.
    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>>;
    /// Latest non-complete round of the game, if any.
    fn find_current_round(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>>;
    /// Rounds of the game ordered by round number.
    fn list_rounds(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>>;
    /// Apply `patch` if `guard` holds for the persisted round. Returns whether it was applied.
    fn patch_round(
        &self,
        id: Uuid,
        guard: RoundGuard,
        patch: RoundPatch,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Insert or overwrite the prompt keyed by (round, player).
    fn upsert_prompt(
        &self,
        round_id: Uuid,
        player_id: Uuid,
        text: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<PromptEntity>>;
    /// Fetch a prompt by id.
    fn find_prompt(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PromptEntity>>>;
    /// Prompts submitted for the round.
    fn list_prompts(&self, round_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<PromptEntity>>>;

    /// Insert or overwrite the vote keyed by (round, voter).
    fn upsert_vote(
        &self,
        round_id: Uuid,
        voter_id: Uuid,
        image_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<VoteEntity>>;
    /// Votes cast in the round.
    fn list_votes(&self, round_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>>;

    /// Record the generation outcome of a prompt. Returns `false` when one already exists.
    fn insert_generated_image(
        &self,
        image: GeneratedImageEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Fetch a generated image row by id.
    fn find_generated_image(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GeneratedImageEntity>>>;
    /// Generation outcomes recorded for the round.
    fn list_generated_images(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GeneratedImageEntity>>>;

    /// Ping the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
