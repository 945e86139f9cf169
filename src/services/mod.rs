/// OpenAPI documentation generation.
pub mod documentation;
/// Image generation dispatch and providers.
pub mod generation;
/// Health check service.
pub mod health_service;
/// Read-only game and round projections.
pub mod public_service;
/// Round creation, phase transitions, game end and timer recovery.
pub mod round_service;
/// Vote tallying and score application.
pub mod scoring;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
/// Prompt and vote submissions.
pub mod submission_service;
/// Prompt visibility check before generation.
pub mod verification;
