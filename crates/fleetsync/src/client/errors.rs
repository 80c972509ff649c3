use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when talking to the directory or the collection service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// API error returned by the remote service.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Remote service asked us to slow down.
    #[error("Rate limited by remote service")]
    RateLimited,

    /// Authentication required or failed.
    #[error("Authentication required")]
    AuthRequired,

    /// Resource not found (collection, endpoint).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The shutdown signal fired while waiting or in flight.
    #[error("Operation cancelled")]
    Cancelled,

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<HttpError> for ClientError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Cancelled => ClientError::Cancelled,
            other => ClientError::network(other.to_string()),
        }
    }
}

impl ClientError {
    /// Create an API error.
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error came from the shutdown signal.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether retrying the same request later may succeed.
    ///
    /// Throttling, server-side failures and transport errors are retryable;
    /// client errors and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Extract a short error message suitable for log lines.
///
/// Takes the first line of an error message, which keeps multi-line API
/// bodies from flooding the per-item failure list.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
