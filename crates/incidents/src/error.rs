//! Error types for the incident API client.

use thiserror::Error;

/// Errors returned by [`crate::IncidentClient`].
#[derive(Debug, Error)]
pub enum IncidentError {
    /// No API key configured; the client is inert
    #[error("Incident API disabled: PORTIA_API_KEY not set")]
    Disabled,

    /// The API rejected our credentials (never retried)
    #[error("Incident API authentication failed - check API key")]
    Unauthorized,

    /// Every attempt failed
    #[error("Incident API request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Building the HTTP client failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A configured header value is not a valid HTTP header
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),

    /// A success response did not carry the expected JSON
    #[error("Failed to decode incident API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result alias for incident API calls.
pub type IncidentResult<T> = Result<T, IncidentError>;
