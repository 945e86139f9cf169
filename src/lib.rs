//! Library crate for prompt-party-back, exposing modules for binaries and integration tests.

pub mod config;
/// Persistence layer: entities, storage errors and store backends.
pub mod dao;
mod dto;
mod error;
/// HTTP route trees.
pub mod routes;
pub mod scheduler;
/// Business logic behind the routes and scheduled actions.
pub mod services;
/// Shared application state and the round state machine.
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
