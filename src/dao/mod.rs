/// Round, prompt, vote and image storage operations.
pub mod game_store;
/// Persisted entity definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
