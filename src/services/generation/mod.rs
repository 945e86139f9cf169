//! Fan-out of a round's prompts to image-generation providers.

/// Batching, fallback and per-prompt outcome recording.
pub mod dispatcher;
/// Provider calling an HTTP image-generation endpoint.
#[cfg(feature = "http-provider")]
pub mod http;
/// Provider abstraction and registry.
pub mod provider;
mod sanitize;

pub use self::dispatcher::generate;
pub use self::provider::{
    GeneratedArtifact, GenerationProvider, PlaceholderProvider, ProviderError, ProviderRegistry,
};
pub use self::sanitize::sanitize_prompt;
