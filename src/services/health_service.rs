use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the storage backend and report degraded mode alongside the generation providers.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_game_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let providers = state.providers();
    let primary = providers.primary();
    HealthResponse::new(
        state.is_degraded().await,
        primary.name().to_owned(),
        providers
            .fallback_for(primary.name())
            .map(|fallback| fallback.name().to_owned()),
    )
}
