use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;

/// Artifact returned by a provider for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// URL or storage reference of the image.
    pub image_url: String,
}

/// Failure reported by a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The call did not answer within the configured bound.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    /// The provider answered but refused or failed this particular prompt.
    #[error("provider rejected the prompt: {0}")]
    Rejected(String),
    /// The provider cannot serve any request (credentials, quota, maintenance).
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// The request never reached the provider.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Whether the failure says nothing about the prompt and everything about the provider.
    ///
    /// Only systemic failures make the dispatcher switch to the fallback provider.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_) | ProviderError::Transport(_)
        )
    }
}

/// Image-generation backend turning a prompt and its question into an artifact.
pub trait GenerationProvider: Send + Sync {
    /// Stable provider name recorded in the image metadata.
    fn name(&self) -> &str;

    /// Provider-specific cap on concurrent calls.
    fn max_concurrent(&self) -> Option<usize> {
        None
    }

    /// Provider-specific pause between two batches.
    fn inter_batch_delay(&self) -> Option<Duration> {
        None
    }

    /// Generate one image. `context` is the question the prompt answers.
    fn generate(
        &self,
        prompt: String,
        context: String,
    ) -> BoxFuture<'static, Result<GeneratedArtifact, ProviderError>>;
}

/// Offline provider producing deterministic placeholder references.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderProvider;

impl PlaceholderProvider {
    /// Name under which the placeholder provider is registered.
    pub const NAME: &'static str = "placeholder";
}

impl GenerationProvider for PlaceholderProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate(
        &self,
        prompt: String,
        _context: String,
    ) -> BoxFuture<'static, Result<GeneratedArtifact, ProviderError>> {
        Box::pin(async move {
            let slug: String = prompt
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_lowercase()
                    } else {
                        '-'
                    }
                })
                .collect();
            let slug = slug
                .split('-')
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("-");
            Ok(GeneratedArtifact {
                image_url: format!("placeholder://{slug}"),
            })
        })
    }
}

/// Providers known to the dispatcher: the default one and an optional fallback.
#[derive(Clone)]
pub struct ProviderRegistry {
    primary: Arc<dyn GenerationProvider>,
    fallback: Option<Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    /// Build a registry. A fallback sharing the primary's name is ignored.
    pub fn new(
        primary: Arc<dyn GenerationProvider>,
        fallback: Option<Arc<dyn GenerationProvider>>,
    ) -> Self {
        let fallback = fallback.filter(|candidate| candidate.name() != primary.name());
        Self { primary, fallback }
    }

    /// Registry that only knows the offline placeholder provider.
    pub fn placeholder() -> Self {
        Self::new(Arc::new(PlaceholderProvider), None)
    }

    /// Build the registry from `GENERATION_ENDPOINT` and `GENERATION_FALLBACK_ENDPOINT`.
    ///
    /// Without an endpoint the placeholder provider is primary. With one, the placeholder
    /// becomes the fallback unless a dedicated fallback endpoint is configured.
    #[cfg(feature = "http-provider")]
    pub fn from_env(timeout: Duration) -> Self {
        use super::http::HttpImageProvider;
        use tracing::{info, warn};

        let endpoint = |var: &str| {
            std::env::var(var)
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let build = |name: &str, url: String| match HttpImageProvider::new(name, url, timeout) {
            Ok(provider) => Some(Arc::new(provider) as Arc<dyn GenerationProvider>),
            Err(err) => {
                warn!(provider = name, error = %err, "failed to build generation provider");
                None
            }
        };

        let primary = endpoint("GENERATION_ENDPOINT").and_then(|url| build("http", url));
        let fallback = endpoint("GENERATION_FALLBACK_ENDPOINT")
            .and_then(|url| build("http-fallback", url));

        let registry = match (primary, fallback) {
            (Some(primary), Some(fallback)) => Self::new(primary, Some(fallback)),
            (Some(primary), None) => Self::new(primary, Some(Arc::new(PlaceholderProvider))),
            (None, fallback) => Self::new(Arc::new(PlaceholderProvider), fallback),
        };
        info!(
            primary = registry.primary.name(),
            fallback = registry.fallback.as_ref().map(|provider| provider.name()),
            "generation providers configured"
        );
        registry
    }

    /// Build the registry when HTTP providers are compiled out.
    #[cfg(not(feature = "http-provider"))]
    pub fn from_env(_timeout: Duration) -> Self {
        Self::placeholder()
    }

    /// Default provider.
    pub fn primary(&self) -> Arc<dyn GenerationProvider> {
        self.primary.clone()
    }

    /// Fallback to use when `active` fails systemically, if any.
    pub fn fallback_for(&self, active: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.fallback
            .as_ref()
            .filter(|fallback| fallback.name() != active)
            .cloned()
    }

    /// Find a registered provider by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        std::iter::once(&self.primary)
            .chain(self.fallback.as_ref())
            .find(|provider| provider.name() == name)
            .cloned()
    }
}
