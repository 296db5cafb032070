// Store module: key-value persistence shared by accounts and call logs

pub mod backend;

pub use backend::{MemoryStorage, SledStorage, StorageBackend};

use thiserror::Error;

/// Errors raised by the user and call-log stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Email already registered: {0}")]
    EmailTaken(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
