use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Game payloads.
pub mod game;
/// Health payloads.
pub mod health;
/// Public round and game status names.
pub mod phase;
/// Round, prompt and vote payloads.
pub mod round;
/// SSE event payloads.
pub mod sse;
pub mod validation;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
