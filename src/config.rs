//! Application-level configuration loading: phase clock, scoring, generation and question pool.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::dao::models::RoundStatus;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PROMPT_PARTY_CONFIG_PATH";
/// Question used when the configured pool is empty.
const FALLBACK_QUESTION: &str = "Draw the thing nobody asked for.";

/// Length of each timed phase of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    /// Time players get to submit their prompts.
    pub prompt: Duration,
    /// Time given to the providers before voting opens.
    pub generation: Duration,
    /// Time players get to vote.
    pub voting: Duration,
    /// Time the scoreboard stays on screen.
    pub results: Duration,
}

impl PhaseDurations {
    /// Duration of the phase a round spends in `status`. `Complete` is untimed.
    pub fn for_status(&self, status: RoundStatus) -> Option<Duration> {
        match status {
            RoundStatus::Prompt => Some(self.prompt),
            RoundStatus::Generating => Some(self.generation),
            RoundStatus::Voting => Some(self.voting),
            RoundStatus::Results => Some(self.results),
            RoundStatus::Complete => None,
        }
    }
}

/// Points handed out by the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringConfig {
    /// Split evenly (rounding down) between the owners of the most-voted images.
    pub points_per_win: u32,
    /// Participation bonus per vote record.
    pub points_per_vote: u32,
}

/// Fan-out limits applied by the generation dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Upper bound on concurrent provider calls; providers may lower it.
    pub max_concurrency: usize,
    /// Pause between two batches, unless the provider asks for its own.
    pub inter_batch_delay: Duration,
    /// Wall-clock bound on a single provider call.
    pub provider_timeout: Duration,
    /// Sanitized prompts are truncated to this many characters.
    pub max_prompt_chars: usize,
}

/// Behaviour of the loop that waits for prompts to become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationConfig {
    /// Reschedules allowed after the first empty read.
    pub max_retries: u32,
    /// Linear backoff unit: attempt `n` waits `(n + 1) * base_delay`.
    pub base_delay: Duration,
    /// Delay between entering `Generating` and the first verification.
    pub initial_delay: Duration,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Phase clock.
    pub phases: PhaseDurations,
    /// Scoring constants.
    pub scoring: ScoringConfig,
    /// Dispatcher limits.
    pub generation: GenerationConfig,
    /// Verification loop settings.
    pub verification: VerificationConfig,
    /// Pause between a completed round and the next round or the end of the game.
    pub next_round_grace: Duration,
    /// Round count used when a start request does not specify one.
    pub default_total_rounds: u32,
    /// Largest round count a game may be started with.
    pub max_total_rounds: u32,
    questions: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        questions = app_config.questions.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Pick a random question that is not listed in `used`.
    ///
    /// Once every question of the pool has been asked, any question may be repeated.
    pub fn pick_question(&self, used: &[String]) -> String {
        let mut rng = rand::rng();
        let fresh: Vec<&String> = self
            .questions
            .iter()
            .filter(|candidate| !used.contains(candidate))
            .collect();
        fresh
            .choose(&mut rng)
            .map(|question| (*question).clone())
            .or_else(|| self.questions.choose(&mut rng).cloned())
            .unwrap_or_else(|| FALLBACK_QUESTION.to_owned())
    }

    /// Replace the question pool.
    #[cfg(test)]
    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    prompt_phase_duration_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    generation_phase_duration_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    voting_phase_duration_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    results_phase_duration_ms: Option<Duration>,
    points_per_win: Option<u32>,
    points_per_vote: Option<u32>,
    max_generation_concurrency: Option<usize>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    inter_batch_delay_ms: Option<Duration>,
    max_verification_retries: Option<u32>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    verification_base_delay_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    verification_initial_delay_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    next_round_grace_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    provider_timeout_ms: Option<Duration>,
    default_total_rounds: Option<u32>,
    max_total_rounds: Option<u32>,
    max_provider_prompt_chars: Option<usize>,
    questions: Option<Vec<String>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let max_total_rounds = value.max_total_rounds.unwrap_or(10).max(1);
        let questions = value
            .questions
            .map(|list| {
                list.into_iter()
                    .map(|question| question.trim().to_owned())
                    .filter(|question| !question.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(default_questions);

        Self {
            phases: PhaseDurations {
                prompt: value
                    .prompt_phase_duration_ms
                    .unwrap_or(Duration::from_secs(60)),
                generation: value
                    .generation_phase_duration_ms
                    .unwrap_or(Duration::from_secs(45)),
                voting: value
                    .voting_phase_duration_ms
                    .unwrap_or(Duration::from_secs(30)),
                results: value
                    .results_phase_duration_ms
                    .unwrap_or(Duration::from_secs(15)),
            },
            scoring: ScoringConfig {
                points_per_win: value.points_per_win.unwrap_or(100),
                points_per_vote: value.points_per_vote.unwrap_or(10),
            },
            generation: GenerationConfig {
                max_concurrency: value.max_generation_concurrency.unwrap_or(3).max(1),
                inter_batch_delay: value
                    .inter_batch_delay_ms
                    .unwrap_or(Duration::from_millis(1500)),
                provider_timeout: value
                    .provider_timeout_ms
                    .unwrap_or(Duration::from_secs(60)),
                max_prompt_chars: value.max_provider_prompt_chars.unwrap_or(200).max(1),
            },
            verification: VerificationConfig {
                max_retries: value.max_verification_retries.unwrap_or(3),
                base_delay: value
                    .verification_base_delay_ms
                    .unwrap_or(Duration::from_secs(1)),
                initial_delay: value
                    .verification_initial_delay_ms
                    .unwrap_or(Duration::from_secs(2)),
            },
            next_round_grace: value.next_round_grace_ms.unwrap_or(Duration::from_secs(5)),
            default_total_rounds: value
                .default_total_rounds
                .unwrap_or(3)
                .clamp(1, max_total_rounds),
            max_total_rounds,
            questions,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in question pool shipped with the binary.
fn default_questions() -> Vec<String> {
    [
        "What does a cat dream about?",
        "Design the mascot of a haunted bakery.",
        "What would a dinosaur wear to a wedding?",
        "Show the worst possible superhero costume.",
        "What is hiding under the bed tonight?",
        "Invent a new national sport.",
        "Paint the album cover of a robot's first mixtape.",
        "What does the moon do on its day off?",
        "Describe the most suspicious vending machine.",
        "What would your houseplant look like as a villain?",
        "Imagine a breakfast served in outer space.",
        "What did the pigeon see?",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.phases.prompt, Duration::from_secs(60));
        assert_eq!(config.scoring.points_per_win, 100);
        assert_eq!(config.scoring.points_per_vote, 10);
        assert_eq!(config.verification.max_retries, 3);
        assert_eq!(config.generation.max_concurrency, 3);
        assert_eq!(config.default_total_rounds, 3);
    }

    #[test]
    fn millisecond_keys_are_parsed() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"prompt_phase_duration_ms": 1000, "inter_batch_delay_ms": 0, "questions": ["Q?"]}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.phases.prompt, Duration::from_millis(1000));
        assert_eq!(config.generation.inter_batch_delay, Duration::ZERO);
        assert_eq!(config.pick_question(&[]), "Q?");
    }

    #[test]
    fn unused_questions_are_preferred() {
        let config = AppConfig::default()
            .with_questions(vec!["first".to_owned(), "second".to_owned()]);
        for _ in 0..20 {
            assert_eq!(config.pick_question(&["first".to_owned()]), "second");
        }
        let repeated = config.pick_question(&["first".to_owned(), "second".to_owned()]);
        assert!(repeated == "first" || repeated == "second");
    }
}
