//! Unified error handling for the client.

use crate::origin::TransportError;
use tether_engine::UniqueId;

/// Client-side sync error.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("engine error: {0}")]
    Engine(#[from] tether_engine::Error),

    /// The conflict-retry budget ran out. The local optimistic copy stays in
    /// the cache; nothing is lost, it is just not confirmed synced.
    #[error("retry budget exhausted after {attempts} attempts for document {unique_id}")]
    RetryExhausted { unique_id: UniqueId, attempts: u32 },

    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("unknown document: {0}")]
    UnknownDocument(UniqueId),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
