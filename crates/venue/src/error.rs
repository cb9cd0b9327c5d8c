//! Error types for venue API operations.

use thiserror::Error;

/// Errors that can occur while talking to the venue REST API.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid API key header value")]
    InvalidApiKey,
}

impl From<serde_json::Error> for VenueError {
    fn from(err: serde_json::Error) -> Self {
        VenueError::ParseError(err.to_string())
    }
}

impl VenueError {
    /// Returns true if this error is transient and the next poll may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            VenueError::Request(e) => e.is_timeout() || e.is_connect(),
            VenueError::Status { status, .. } => *status == 429 || *status >= 500,
            VenueError::ParseError(_) | VenueError::InvalidApiKey => false,
        }
    }
}
