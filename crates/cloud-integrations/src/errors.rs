//! Error types for the cloud storage and whiteboard clients

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out")]
    Timeout,

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Timed out waiting for the OAuth callback")]
    CallbackTimeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Excel export failed: {0}")]
    Excel(#[from] rust_xlsxwriter::XlsxError),
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IntegrationError::Timeout
        } else {
            IntegrationError::Http(err.to_string())
        }
    }
}

impl IntegrationError {
    /// True for HTTP 401, which callers answer with one token refresh
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, IntegrationError::Status { status: 401, .. })
    }
}
