//! Error types for the Lectern SDK.

use lectern_core::{ReduceError, Source};
use thiserror::Error;

/// Error type for engine and service operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Feed {feed} failed: {reason}")]
    FeedFailed { feed: Source, reason: String },

    #[error("Reduce error: {0}")]
    Reduce(#[from] ReduceError),

    #[error("Statistics source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, EngineError>;
