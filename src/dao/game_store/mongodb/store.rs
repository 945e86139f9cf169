use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        GAMES, IMAGES, MongoGameDocument, MongoImageDocument, MongoPlayerDocument,
        MongoPromptDocument, MongoRoundDocument, MongoVoteDocument, PLAYERS, PROMPTS, ROUNDS,
        VOTES, bson_time, doc_id, guard_filter, patch_document,
    },
};
use crate::dao::{
    game_store::GameStore,
    models::{
        GameEntity, GameStatus, GeneratedImageEntity, PlayerEntity, PromptEntity, RoundEntity,
        RoundGuard, RoundPatch, RoundStatus, VoteEntity,
    },
    storage::StorageResult,
};

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed [`GameStore`]; uniqueness of prompts, votes and images relies on indexes.
#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) => failure.code == DUPLICATE_KEY,
        ErrorKind::Command(failure) => failure.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(Some(name.to_owned()))
                .unique(Some(true))
                .build(),
        )
        .build()
}

fn plain_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(Some(name.to_owned())).build())
        .build()
}

fn collect_entities<D, E>(documents: Vec<D>) -> StorageResult<Vec<E>>
where
    E: TryFrom<D, Error = crate::dao::storage::StorageError>,
{
    documents.into_iter().map(E::try_from).collect()
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, IndexModel); 6] = [
            (
                ROUNDS,
                "game_id,round_number",
                unique_index(doc! {"game_id": 1, "round_number": 1}, "round_number_idx"),
            ),
            (
                PROMPTS,
                "round_id,player_id",
                unique_index(doc! {"round_id": 1, "player_id": 1}, "prompt_player_idx"),
            ),
            (
                VOTES,
                "round_id,voter_id",
                unique_index(doc! {"round_id": 1, "voter_id": 1}, "vote_voter_idx"),
            ),
            (
                IMAGES,
                "prompt_id",
                unique_index(doc! {"prompt_id": 1}, "image_prompt_idx"),
            ),
            (
                IMAGES,
                "round_id",
                plain_index(doc! {"round_id": 1}, "image_round_idx"),
            ),
            (
                PLAYERS,
                "game_id",
                plain_index(doc! {"game_id": 1}, "player_game_idx"),
            ),
        ];

        let database = self.database().await;
        for (collection, index, model) in indexes {
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<T>(name)
    }

    async fn insert_game(&self, game: GameEntity) -> StorageResult<()> {
        let id = game.id.to_string();
        let document: MongoGameDocument = game.into();
        self.collection::<MongoGameDocument>(GAMES)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: GAMES,
                id,
                source,
            })?;
        Ok(())
    }

    async fn find_game(&self, id: Uuid) -> StorageResult<Option<GameEntity>> {
        let document = self
            .collection::<MongoGameDocument>(GAMES)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: GAMES,
                source,
            })?;
        document.map(GameEntity::try_from).transpose()
    }

    async fn finish_game(&self, id: Uuid, at: SystemTime) -> StorageResult<bool> {
        let result = self
            .collection::<MongoGameDocument>(GAMES)
            .await
            .update_one(
                doc! {"_id": id.to_string(), "status": GameStatus::Active.as_str()},
                doc! {"$set": {"status": GameStatus::Ended.as_str(), "ended_at": bson_time(at)}},
            )
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: GAMES,
                id: id.to_string(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn list_active_games(&self) -> StorageResult<Vec<GameEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: GAMES,
            source,
        };
        let documents: Vec<MongoGameDocument> = self
            .collection::<MongoGameDocument>(GAMES)
            .await
            .find(doc! {"status": GameStatus::Active.as_str()})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        collect_entities(documents)
    }

    async fn insert_player(&self, player: PlayerEntity) -> StorageResult<()> {
        let id = player.id.to_string();
        let document: MongoPlayerDocument = player.into();
        self.collection::<MongoPlayerDocument>(PLAYERS)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PLAYERS,
                id,
                source,
            })?;
        Ok(())
    }

    async fn list_players(&self, game_id: Uuid) -> StorageResult<Vec<PlayerEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: PLAYERS,
            source,
        };
        let documents: Vec<MongoPlayerDocument> = self
            .collection::<MongoPlayerDocument>(PLAYERS)
            .await
            .find(doc! {"game_id": game_id.to_string()})
            .sort(doc! {"name": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        collect_entities(documents)
    }

    async fn patch_player_score(&self, player_id: Uuid, delta: u32) -> StorageResult<bool> {
        let result = self
            .collection::<MongoPlayerDocument>(PLAYERS)
            .await
            .update_one(doc_id(player_id), doc! {"$inc": {"score": i64::from(delta)}})
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PLAYERS,
                id: player_id.to_string(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn insert_round(&self, round: RoundEntity) -> StorageResult<bool> {
        let id = round.id.to_string();
        let document: MongoRoundDocument = round.into();
        match self
            .collection::<MongoRoundDocument>(ROUNDS)
            .await
            .insert_one(&document)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => {
                debug!(round_id = %id, "round number already taken");
                Ok(false)
            }
            Err(source) => Err(MongoDaoError::Write {
                collection: ROUNDS,
                id,
                source,
            }
            .into()),
        }
    }

    async fn find_round_where(&self, filter: Document) -> StorageResult<Option<RoundEntity>> {
        let document = self
            .collection::<MongoRoundDocument>(ROUNDS)
            .await
            .find_one(filter)
            .sort(doc! {"round_number": -1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ROUNDS,
                source,
            })?;
        document.map(RoundEntity::try_from).transpose()
    }

    async fn list_rounds(&self, game_id: Uuid) -> StorageResult<Vec<RoundEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: ROUNDS,
            source,
        };
        let documents: Vec<MongoRoundDocument> = self
            .collection::<MongoRoundDocument>(ROUNDS)
            .await
            .find(doc! {"game_id": game_id.to_string()})
            .sort(doc! {"round_number": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        collect_entities(documents)
    }

    async fn patch_round(
        &self,
        id: Uuid,
        guard: RoundGuard,
        patch: RoundPatch,
    ) -> StorageResult<bool> {
        let filter = guard_filter(id, guard);
        let set = patch_document(&patch);
        if set.is_empty() {
            return Ok(self.find_round_where(filter).await?.is_some());
        }

        let result = self
            .collection::<MongoRoundDocument>(ROUNDS)
            .await
            .update_one(filter, doc! {"$set": set})
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ROUNDS,
                id: id.to_string(),
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    /// Upsert keyed by a unique compound filter, retrying once when two writers race on
    /// the insert.
    async fn upsert_by<T>(
        &self,
        collection: &'static str,
        filter: Document,
        set: Document,
    ) -> StorageResult<T>
    where
        T: serde::de::DeserializeOwned + Send + Sync,
    {
        let coll = self.collection::<T>(collection).await;
        let mut retried = false;
        loop {
            let update = doc! {
                "$set": set.clone(),
                "$setOnInsert": {"_id": Uuid::new_v4().to_string()},
            };
            let outcome = coll
                .find_one_and_update(filter.clone(), update)
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await;
            match outcome {
                Ok(Some(document)) => return Ok(document),
                Ok(None) => {
                    return Err(crate::dao::storage::StorageError::corrupted(
                        collection,
                        filter.to_string(),
                        "upsert returned no document",
                    ));
                }
                Err(err) if !retried && is_duplicate_key(&err) => {
                    retried = true;
                }
                Err(source) => {
                    return Err(MongoDaoError::Write {
                        collection,
                        id: filter.to_string(),
                        source,
                    }
                    .into());
                }
            }
        }
    }

    async fn upsert_prompt(
        &self,
        round_id: Uuid,
        player_id: Uuid,
        text: String,
        at: SystemTime,
    ) -> StorageResult<PromptEntity> {
        let document: MongoPromptDocument = self
            .upsert_by(
                PROMPTS,
                doc! {"round_id": round_id.to_string(), "player_id": player_id.to_string()},
                doc! {"text": text, "submitted_at": bson_time(at)},
            )
            .await?;
        document.try_into()
    }

    async fn find_prompt(&self, id: Uuid) -> StorageResult<Option<PromptEntity>> {
        let document = self
            .collection::<MongoPromptDocument>(PROMPTS)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PROMPTS,
                source,
            })?;
        document.map(PromptEntity::try_from).transpose()
    }

    async fn list_prompts(&self, round_id: Uuid) -> StorageResult<Vec<PromptEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: PROMPTS,
            source,
        };
        let documents: Vec<MongoPromptDocument> = self
            .collection::<MongoPromptDocument>(PROMPTS)
            .await
            .find(doc! {"round_id": round_id.to_string()})
            .sort(doc! {"submitted_at": 1, "_id": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        collect_entities(documents)
    }

    async fn upsert_vote(
        &self,
        round_id: Uuid,
        voter_id: Uuid,
        image_id: Uuid,
        at: SystemTime,
    ) -> StorageResult<VoteEntity> {
        let document: MongoVoteDocument = self
            .upsert_by(
                VOTES,
                doc! {"round_id": round_id.to_string(), "voter_id": voter_id.to_string()},
                doc! {"image_id": image_id.to_string(), "cast_at": bson_time(at)},
            )
            .await?;
        document.try_into()
    }

    async fn list_votes(&self, round_id: Uuid) -> StorageResult<Vec<VoteEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: VOTES,
            source,
        };
        let documents: Vec<MongoVoteDocument> = self
            .collection::<MongoVoteDocument>(VOTES)
            .await
            .find(doc! {"round_id": round_id.to_string()})
            .sort(doc! {"cast_at": 1, "_id": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        collect_entities(documents)
    }

    async fn insert_generated_image(&self, image: GeneratedImageEntity) -> StorageResult<bool> {
        let id = image.id.to_string();
        let document: MongoImageDocument = image.into();
        match self
            .collection::<MongoImageDocument>(IMAGES)
            .await
            .insert_one(&document)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Write {
                collection: IMAGES,
                id,
                source,
            }
            .into()),
        }
    }

    async fn find_generated_image(&self, id: Uuid) -> StorageResult<Option<GeneratedImageEntity>> {
        let document = self
            .collection::<MongoImageDocument>(IMAGES)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: IMAGES,
                source,
            })?;
        document.map(GeneratedImageEntity::try_from).transpose()
    }

    async fn list_generated_images(
        &self,
        round_id: Uuid,
    ) -> StorageResult<Vec<GeneratedImageEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: IMAGES,
            source,
        };
        let documents: Vec<MongoImageDocument> = self
            .collection::<MongoImageDocument>(IMAGES)
            .await
            .find(doc! {"round_id": round_id.to_string()})
            .sort(doc! {"created_at": 1, "_id": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        collect_entities(documents)
    }
}

impl GameStore for MongoGameStore {
    fn insert_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_game(game).await })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await })
    }

    fn finish_game(&self, id: Uuid, at: SystemTime) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.finish_game(id, at).await })
    }

    fn list_active_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_active_games().await })
    }

    fn insert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_player(player).await })
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(game_id).await })
    }

    fn patch_player_score(
        &self,
        player_id: Uuid,
        delta: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.patch_player_score(player_id, delta).await })
    }

    fn insert_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_round(round).await })
    }

    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_round_where(doc_id(id)).await })
    }

    fn find_current_round(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_round_where(doc! {
                    "game_id": game_id.to_string(),
                    "status": {"$ne": RoundStatus::Complete.as_str()},
                })
                .await
        })
    }

    fn list_rounds(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_rounds(game_id).await })
    }

    fn patch_round(
        &self,
        id: Uuid,
        guard: RoundGuard,
        patch: RoundPatch,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.patch_round(id, guard, patch).await })
    }

    fn upsert_prompt(
        &self,
        round_id: Uuid,
        player_id: Uuid,
        text: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<PromptEntity>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_prompt(round_id, player_id, text, at).await })
    }

    fn find_prompt(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PromptEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_prompt(id).await })
    }

    fn list_prompts(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PromptEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_prompts(round_id).await })
    }

    fn upsert_vote(
        &self,
        round_id: Uuid,
        voter_id: Uuid,
        image_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<VoteEntity>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_vote(round_id, voter_id, image_id, at).await })
    }

    fn list_votes(&self, round_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_votes(round_id).await })
    }

    fn insert_generated_image(
        &self,
        image: GeneratedImageEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_generated_image(image).await })
    }

    fn find_generated_image(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GeneratedImageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_generated_image(id).await })
    }

    fn list_generated_images(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GeneratedImageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_generated_images(round_id).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
