use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A persisted record could not be mapped back into a domain entity.
    #[error("corrupted {collection} record `{id}`: {reason}")]
    Corrupted {
        collection: &'static str,
        id: String,
        reason: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a corruption error for a record that failed to decode.
    pub fn corrupted(
        collection: &'static str,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        StorageError::Corrupted {
            collection,
            id: id.into(),
            reason: reason.into(),
        }
    }
}
