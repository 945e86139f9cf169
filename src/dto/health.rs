use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" while a storage backend answers, "degraded" otherwise.
    pub status: String,
    /// Provider used first for image generation.
    pub generation_provider: String,
    /// Provider used when the primary one fails systemically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,
}

impl HealthResponse {
    /// Build the payload from the degraded flag and the registered provider names.
    pub fn new(
        degraded: bool,
        generation_provider: String,
        fallback_provider: Option<String>,
    ) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            generation_provider,
            fallback_provider,
        }
    }
}
