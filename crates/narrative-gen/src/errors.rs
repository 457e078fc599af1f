//! Error types for narrative generation

use thiserror::Error;

/// Errors from the external text API and the on-disk cache
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Text API is not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Text API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("Cache IO error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Cache format error: {0}")]
    CacheFormat(#[from] serde_json::Error),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::RequestFailed(err.to_string())
        }
    }
}
