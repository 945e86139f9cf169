use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use futures::future::join_all;
use tokio::time::{Duration, Instant, sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    provider::{GeneratedArtifact, GenerationProvider, ProviderError},
    sanitize::sanitize_prompt,
};
use crate::{
    config::GenerationConfig,
    dao::{
        game_store::GameStore,
        models::{
            GeneratedImageEntity, GenerationMetadata, ImageOutcome, PromptEntity, RoundGuard,
            RoundPatch,
        },
        storage::StorageError,
    },
    error::ServiceError,
    services::sse_events,
    state::SharedState,
};

/// A prompt ready to be sent out.
struct Job {
    prompt_id: Uuid,
    text: String,
}

struct CallResult {
    prompt_id: Uuid,
    result: Result<GeneratedArtifact, ProviderError>,
    elapsed: Duration,
}

enum RunOutcome {
    Completed,
    /// The first batch failed as a whole before any prompt was recorded.
    Systemic(ProviderError),
}

struct Dispatch<'a> {
    store: Arc<dyn GameStore>,
    round_id: Uuid,
    question: &'a str,
    limits: GenerationConfig,
    /// First row that could not be written.
    lost_row: Mutex<Option<StorageError>>,
}

const BLANK_PROMPT_ERROR: &str = "prompt is empty once sanitized";

/// Generate one image per prompt and record every outcome.
///
/// `provider` selects a registered provider by name; the registry's primary is used
/// otherwise. Each prompt ends with exactly one generated-image row, success or failure.
/// Prompts left blank by sanitization are recorded as failures without calling out.
///
/// When a row cannot be written the round's diagnostics are left open and the storage
/// error is returned, so the dispatch can be resumed for the prompts still missing a row.
pub async fn generate(
    state: &SharedState,
    round_id: Uuid,
    question: &str,
    prompts: Vec<PromptEntity>,
    provider: Option<&str>,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let registry = state.providers();
    let limits = state.config().generation;

    let primary = match provider {
        Some(name) => registry.lookup(name).ok_or_else(|| {
            ServiceError::InvalidInput(format!("unknown generation provider `{name}`"))
        })?,
        None => registry.primary(),
    };

    let (jobs, blank): (Vec<Job>, Vec<Job>) = prompts
        .into_iter()
        .map(|prompt| Job {
            prompt_id: prompt.id,
            text: sanitize_prompt(&prompt.text, limits.max_prompt_chars),
        })
        .partition(|job| !job.text.is_empty());

    info!(
        %round_id,
        provider = primary.name(),
        prompts = jobs.len(),
        "dispatching image generation"
    );

    let dispatch = Dispatch {
        store: store.clone(),
        round_id,
        question,
        limits,
        lost_row: Mutex::new(None),
    };

    if !blank.is_empty() {
        warn!(%round_id, prompts = blank.len(), "skipping prompts left blank by sanitization");
        dispatch
            .record_failures(primary.name(), false, &blank, BLANK_PROMPT_ERROR)
            .await;
    }

    let fatal = match dispatch.run(primary.clone(), false, &jobs).await {
        RunOutcome::Completed => None,
        RunOutcome::Systemic(err) => match registry.fallback_for(primary.name()) {
            Some(fallback) => {
                warn!(
                    %round_id,
                    provider = primary.name(),
                    fallback = fallback.name(),
                    error = %err,
                    "primary provider failed systemically; switching to fallback"
                );
                match dispatch.run(fallback.clone(), true, &jobs).await {
                    RunOutcome::Completed => None,
                    RunOutcome::Systemic(fallback_err) => {
                        error!(
                            %round_id,
                            provider = fallback.name(),
                            error = %fallback_err,
                            "fallback provider failed systemically"
                        );
                        let reason = fallback_err.to_string();
                        dispatch
                            .record_failures(fallback.name(), true, &jobs, &reason)
                            .await;
                        Some(fallback_err)
                    }
                }
            }
            None => {
                error!(
                    %round_id,
                    provider = primary.name(),
                    error = %err,
                    "provider failed systemically and no fallback is registered"
                );
                dispatch
                    .record_failures(primary.name(), false, &jobs, &err.to_string())
                    .await;
                Some(err)
            }
        },
    };

    if let Some(err) = dispatch.take_lost_row() {
        error!(%round_id, error = %err, "image generation left prompts without a row");
        return Err(err.into());
    }

    let now = SystemTime::now();
    let patch = match &fatal {
        None => RoundPatch {
            generation_completed_at: Some(now),
            ..RoundPatch::default()
        },
        Some(err) => RoundPatch {
            generation_error: Some(err.to_string()),
            ..RoundPatch::default()
        },
    };
    store.patch_round(round_id, RoundGuard::Any, patch).await?;

    let images = store.list_generated_images(round_id).await?;
    let succeeded = images.iter().filter(|image| image.image_url().is_some()).count();
    info!(
        %round_id,
        succeeded,
        failed = images.len() - succeeded,
        "image generation finished"
    );
    sse_events::broadcast_images_ready(state, round_id, succeeded, images.len() - succeeded);
    Ok(())
}

impl Dispatch<'_> {
    /// Process `jobs` in sequential batches of concurrent calls.
    async fn run(
        &self,
        provider: Arc<dyn GenerationProvider>,
        fallback: bool,
        jobs: &[Job],
    ) -> RunOutcome {
        let batch_size = provider
            .max_concurrent()
            .map_or(self.limits.max_concurrency, |cap| {
                cap.min(self.limits.max_concurrency)
            })
            .max(1);
        let pause = provider
            .inter_batch_delay()
            .unwrap_or(self.limits.inter_batch_delay);

        for (index, batch) in jobs.chunks(batch_size).enumerate() {
            if index > 0 && !pause.is_zero() {
                sleep(pause).await;
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|job| self.call(provider.clone(), job)),
            )
            .await;

            if index == 0 {
                if let Some(err) = systemic_failure(&results) {
                    return RunOutcome::Systemic(err);
                }
            }

            self.persist(provider.name(), fallback, results).await;
        }

        RunOutcome::Completed
    }

    async fn call(&self, provider: Arc<dyn GenerationProvider>, job: &Job) -> CallResult {
        let started = Instant::now();
        let call = provider.generate(job.text.clone(), self.question.to_owned());
        let result = match timeout(self.limits.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.limits.provider_timeout)),
        };
        CallResult {
            prompt_id: job.prompt_id,
            result,
            elapsed: started.elapsed(),
        }
    }

    async fn persist(&self, provider: &str, fallback: bool, results: Vec<CallResult>) {
        let inserts = results.into_iter().map(|call| {
            let outcome = match call.result {
                Ok(artifact) => ImageOutcome::Success {
                    image_url: artifact.image_url,
                },
                Err(err) => {
                    warn!(
                        round_id = %self.round_id,
                        prompt_id = %call.prompt_id,
                        provider,
                        error = %err,
                        "image generation failed for prompt"
                    );
                    ImageOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            self.record(call.prompt_id, outcome, provider, call.elapsed, fallback)
        });
        join_all(inserts).await;
    }

    async fn record_failures(
        &self,
        provider: &str,
        fallback: bool,
        jobs: &[Job],
        error: &str,
    ) {
        let inserts = jobs.iter().map(|job| {
            self.record(
                job.prompt_id,
                ImageOutcome::Failed {
                    error: error.to_owned(),
                },
                provider,
                Duration::ZERO,
                fallback,
            )
        });
        join_all(inserts).await;
    }

    fn take_lost_row(&self) -> Option<StorageError> {
        self.lost_row.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Insert a single row. Storage failures are kept aside so sibling prompts still land.
    async fn record(
        &self,
        prompt_id: Uuid,
        outcome: ImageOutcome,
        provider: &str,
        elapsed: Duration,
        fallback: bool,
    ) {
        let image = GeneratedImageEntity {
            id: Uuid::new_v4(),
            prompt_id,
            round_id: self.round_id,
            outcome,
            metadata: GenerationMetadata {
                provider: provider.to_owned(),
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                fallback,
            },
            created_at: SystemTime::now(),
        };
        match self.store.insert_generated_image(image).await {
            Ok(true) => {}
            Ok(false) => debug!(%prompt_id, "prompt already has a generated image"),
            Err(err) => {
                error!(
                    round_id = %self.round_id,
                    %prompt_id,
                    error = %err,
                    "failed to record generated image"
                );
                if let Ok(mut slot) = self.lost_row.lock() {
                    slot.get_or_insert(err);
                }
            }
        }
    }
}

/// The shared error when every call of a batch failed for a provider-wide reason.
fn systemic_failure(results: &[CallResult]) -> Option<ProviderError> {
    let first = results.first()?.result.as_ref().err()?.clone();
    let all_systemic = first.is_systemic()
        && results.iter().all(|call| {
            call.result
                .as_ref()
                .err()
                .is_some_and(ProviderError::is_systemic)
        });
    all_systemic.then_some(first)
}
