//! BSON document shapes and their conversions to the storage entities.
//!
//! Identifiers are stored as hyphenated strings so filters and documents always agree on
//! the representation.

use std::time::SystemTime;

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::{
    models::{
        GameEntity, GameStatus, GeneratedImageEntity, GenerationMetadata, ImageOutcome,
        PlayerEntity, PromptEntity, RoundEntity, RoundGuard, RoundPatch, RoundStatus, VoteEntity,
    },
    storage::{StorageError, StorageResult},
};

pub const GAMES: &str = "games";
pub const PLAYERS: &str = "players";
pub const ROUNDS: &str = "rounds";
pub const PROMPTS: &str = "prompts";
pub const VOTES: &str = "votes";
pub const IMAGES: &str = "generated_images";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub total_rounds: i64,
    pub status: String,
    pub created_at: DateTime,
    pub ended_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub game_id: String,
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoundDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub game_id: String,
    pub round_number: i64,
    pub status: String,
    pub phase_deadline: DateTime,
    pub question_text: String,
    pub created_at: DateTime,
    pub status_changed_at: DateTime,
    pub generation_started_at: Option<DateTime>,
    pub generation_dispatched_at: Option<DateTime>,
    pub generation_completed_at: Option<DateTime>,
    pub generation_error: Option<String>,
    pub scored_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPromptDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub round_id: String,
    pub player_id: String,
    pub text: String,
    pub submitted_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub round_id: String,
    pub voter_id: String,
    pub image_id: String,
    pub cast_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoImageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub prompt_id: String,
    pub round_id: String,
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub provider: String,
    pub elapsed_ms: i64,
    pub fallback: bool,
    pub created_at: DateTime,
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn bson_time(at: SystemTime) -> DateTime {
    DateTime::from_system_time(at)
}

fn parse_id(collection: &'static str, record: &str, value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|err| StorageError::corrupted(collection, record, format!("invalid uuid: {err}")))
}

fn parse_count(collection: &'static str, record: &str, value: i64) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| {
        StorageError::corrupted(collection, record, format!("out of range count {value}"))
    })
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name,
            total_rounds: i64::from(value.total_rounds),
            status: value.status.as_str().to_owned(),
            created_at: bson_time(value.created_at),
            ended_at: value.ended_at.map(bson_time),
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = StorageError;

    fn try_from(value: MongoGameDocument) -> StorageResult<Self> {
        let status = match value.status.as_str() {
            "active" => GameStatus::Active,
            "ended" => GameStatus::Ended,
            other => {
                return Err(StorageError::corrupted(
                    GAMES,
                    &value.id,
                    format!("unknown status `{other}`"),
                ));
            }
        };
        Ok(Self {
            id: parse_id(GAMES, &value.id, &value.id)?,
            total_rounds: parse_count(GAMES, &value.id, value.total_rounds)?,
            name: value.name,
            status,
            created_at: value.created_at.to_system_time(),
            ended_at: value.ended_at.map(DateTime::to_system_time),
        })
    }
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            name: value.name,
            score: i64::from(value.score),
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = StorageError;

    fn try_from(value: MongoPlayerDocument) -> StorageResult<Self> {
        Ok(Self {
            id: parse_id(PLAYERS, &value.id, &value.id)?,
            game_id: parse_id(PLAYERS, &value.id, &value.game_id)?,
            score: parse_count(PLAYERS, &value.id, value.score)?,
            name: value.name,
        })
    }
}

impl From<RoundEntity> for MongoRoundDocument {
    fn from(value: RoundEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            round_number: i64::from(value.round_number),
            status: value.status.as_str().to_owned(),
            phase_deadline: bson_time(value.phase_deadline),
            question_text: value.question_text,
            created_at: bson_time(value.created_at),
            status_changed_at: bson_time(value.status_changed_at),
            generation_started_at: value.generation_started_at.map(bson_time),
            generation_dispatched_at: value.generation_dispatched_at.map(bson_time),
            generation_completed_at: value.generation_completed_at.map(bson_time),
            generation_error: value.generation_error,
            scored_at: value.scored_at.map(bson_time),
            ended_at: value.ended_at.map(bson_time),
        }
    }
}

impl TryFrom<MongoRoundDocument> for RoundEntity {
    type Error = StorageError;

    fn try_from(value: MongoRoundDocument) -> StorageResult<Self> {
        let status = RoundStatus::parse(&value.status).ok_or_else(|| {
            StorageError::corrupted(
                ROUNDS,
                &value.id,
                format!("unknown status `{}`", value.status),
            )
        })?;
        Ok(Self {
            id: parse_id(ROUNDS, &value.id, &value.id)?,
            game_id: parse_id(ROUNDS, &value.id, &value.game_id)?,
            round_number: parse_count(ROUNDS, &value.id, value.round_number)?,
            status,
            phase_deadline: value.phase_deadline.to_system_time(),
            question_text: value.question_text,
            created_at: value.created_at.to_system_time(),
            status_changed_at: value.status_changed_at.to_system_time(),
            generation_started_at: value.generation_started_at.map(DateTime::to_system_time),
            generation_dispatched_at: value
                .generation_dispatched_at
                .map(DateTime::to_system_time),
            generation_completed_at: value.generation_completed_at.map(DateTime::to_system_time),
            generation_error: value.generation_error,
            scored_at: value.scored_at.map(DateTime::to_system_time),
            ended_at: value.ended_at.map(DateTime::to_system_time),
        })
    }
}

impl TryFrom<MongoPromptDocument> for PromptEntity {
    type Error = StorageError;

    fn try_from(value: MongoPromptDocument) -> StorageResult<Self> {
        Ok(Self {
            id: parse_id(PROMPTS, &value.id, &value.id)?,
            round_id: parse_id(PROMPTS, &value.id, &value.round_id)?,
            player_id: parse_id(PROMPTS, &value.id, &value.player_id)?,
            text: value.text,
            submitted_at: value.submitted_at.to_system_time(),
        })
    }
}

impl TryFrom<MongoVoteDocument> for VoteEntity {
    type Error = StorageError;

    fn try_from(value: MongoVoteDocument) -> StorageResult<Self> {
        Ok(Self {
            id: parse_id(VOTES, &value.id, &value.id)?,
            round_id: parse_id(VOTES, &value.id, &value.round_id)?,
            voter_id: parse_id(VOTES, &value.id, &value.voter_id)?,
            image_id: parse_id(VOTES, &value.id, &value.image_id)?,
            cast_at: value.cast_at.to_system_time(),
        })
    }
}

impl From<GeneratedImageEntity> for MongoImageDocument {
    fn from(value: GeneratedImageEntity) -> Self {
        let (image_url, error) = match value.outcome {
            ImageOutcome::Success { image_url } => (Some(image_url), None),
            ImageOutcome::Failed { error } => (None, Some(error)),
        };
        Self {
            id: value.id.to_string(),
            prompt_id: value.prompt_id.to_string(),
            round_id: value.round_id.to_string(),
            image_url,
            error,
            provider: value.metadata.provider,
            elapsed_ms: i64::try_from(value.metadata.elapsed_ms).unwrap_or(i64::MAX),
            fallback: value.metadata.fallback,
            created_at: bson_time(value.created_at),
        }
    }
}

impl TryFrom<MongoImageDocument> for GeneratedImageEntity {
    type Error = StorageError;

    fn try_from(value: MongoImageDocument) -> StorageResult<Self> {
        let outcome = match (value.image_url, value.error) {
            (Some(image_url), None) => ImageOutcome::Success { image_url },
            (None, Some(error)) => ImageOutcome::Failed { error },
            _ => {
                return Err(StorageError::corrupted(
                    IMAGES,
                    &value.id,
                    "exactly one of image_url and error must be set",
                ));
            }
        };
        Ok(Self {
            id: parse_id(IMAGES, &value.id, &value.id)?,
            prompt_id: parse_id(IMAGES, &value.id, &value.prompt_id)?,
            round_id: parse_id(IMAGES, &value.id, &value.round_id)?,
            outcome,
            metadata: GenerationMetadata {
                provider: value.provider,
                elapsed_ms: u64::try_from(value.elapsed_ms).unwrap_or_default(),
                fallback: value.fallback,
            },
            created_at: value.created_at.to_system_time(),
        })
    }
}

/// Translate a [`RoundGuard`] into extra filter clauses on the round document.
pub fn guard_filter(id: Uuid, guard: RoundGuard) -> Document {
    let mut filter = doc_id(id);
    match guard {
        RoundGuard::Any => {}
        RoundGuard::Status(status) => {
            filter.insert("status", status.as_str());
        }
        RoundGuard::NotScored => {
            filter.insert("scored_at", mongodb::bson::Bson::Null);
        }
        RoundGuard::NotDispatched => {
            filter.insert("generation_dispatched_at", mongodb::bson::Bson::Null);
        }
    }
    filter
}

/// Translate a [`RoundPatch`] into a `$set` document (empty when nothing changes).
pub fn patch_document(patch: &RoundPatch) -> Document {
    let mut set = Document::new();
    if let Some(status) = patch.status {
        set.insert("status", status.as_str());
    }
    let times = [
        ("phase_deadline", patch.phase_deadline),
        ("status_changed_at", patch.status_changed_at),
        ("generation_started_at", patch.generation_started_at),
        ("generation_dispatched_at", patch.generation_dispatched_at),
        ("generation_completed_at", patch.generation_completed_at),
        ("scored_at", patch.scored_at),
        ("ended_at", patch.ended_at),
    ];
    for (field, value) in times {
        if let Some(at) = value {
            set.insert(field, bson_time(at));
        }
    }
    if let Some(error) = &patch.generation_error {
        set.insert("generation_error", error.clone());
    }
    set
}
