//! Error types for Kandji API operations.

use thiserror::Error;

use crate::client::ClientError;
use crate::http::HttpError;

/// Errors that can occur when talking to the Kandji API.
#[derive(Debug, Error)]
pub enum KandjiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Too many requests.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Authentication failed or token invalid.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The shutdown signal fired.
    #[error("Request cancelled")]
    Cancelled,
}

impl From<HttpError> for KandjiError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Cancelled => KandjiError::Cancelled,
            other => KandjiError::Http(other.to_string()),
        }
    }
}

impl From<KandjiError> for ClientError {
    fn from(err: KandjiError) -> Self {
        match err {
            KandjiError::Http(message) => ClientError::Network { message },
            KandjiError::Json(e) => ClientError::decode(format!("Kandji response: {e}")),
            KandjiError::Api { status, message } => match status {
                401 | 403 => ClientError::AuthRequired,
                404 => ClientError::NotFound { resource: message },
                429 => ClientError::RateLimited,
                _ => ClientError::Api { status, message },
            },
            KandjiError::RateLimited => ClientError::RateLimited,
            KandjiError::Auth(_) => ClientError::AuthRequired,
            KandjiError::Config(message) => ClientError::Internal { message },
            KandjiError::Cancelled => ClientError::Cancelled,
        }
    }
}
