//! Error types for prefixcache.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the cache facade to its callers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache has never been populated and the refresh that was just
    /// attempted did not produce any data.
    #[error("No cached ranges available: {0}")]
    Unavailable(String),

    #[error("Refresh task failed: {0}")]
    RefreshTask(String),
}

impl CacheError {
    /// Stable error name used in structured responses.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Unavailable(_) => "ScriptGenerationError",
            CacheError::RefreshTask(_) => "RefreshError",
        }
    }

    /// `{error, message}` body for the request surface.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Structured error body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Errors raised by [`crate::store::RangeStore`] implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt store file {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
