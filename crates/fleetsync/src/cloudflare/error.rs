//! Error types for Cloudflare Gateway API operations.

use thiserror::Error;

use super::types::ApiMessage;
use crate::client::ClientError;
use crate::http::HttpError;

/// Errors that can occur when talking to the Cloudflare API.
#[derive(Debug, Error)]
pub enum CloudflareError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// 2xx response whose envelope reported `success: false`.
    #[error("request rejected: {}", join_messages(.errors))]
    Rejected { errors: Vec<ApiMessage> },

    /// Too many requests.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Authentication failed or token invalid.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// List not found.
    #[error("List not found: {0}")]
    ListNotFound(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The shutdown signal fired.
    #[error("Request cancelled")]
    Cancelled,
}

fn join_messages(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CloudflareError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the request was rejected because a value already exists.
    pub fn is_duplicate(&self) -> bool {
        let mentions_duplicate = |message: &str| {
            let message = message.to_ascii_lowercase();
            message.contains("duplicate") || message.contains("already exists")
        };
        match self {
            Self::Rejected { errors } => errors.iter().any(|e| mentions_duplicate(&e.message)),
            Self::Api { status, message } => {
                (400..500).contains(status) && mentions_duplicate(message)
            }
            _ => false,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<HttpError> for CloudflareError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Cancelled => CloudflareError::Cancelled,
            other => CloudflareError::Http(other.to_string()),
        }
    }
}

impl From<CloudflareError> for ClientError {
    fn from(err: CloudflareError) -> Self {
        match err {
            CloudflareError::Http(message) => ClientError::Network { message },
            CloudflareError::Json(e) => ClientError::decode(format!("Cloudflare response: {e}")),
            CloudflareError::Api { status, message } => match status {
                401 | 403 => ClientError::AuthRequired,
                404 => ClientError::NotFound { resource: message },
                429 => ClientError::RateLimited,
                _ => ClientError::Api { status, message },
            },
            err @ CloudflareError::Rejected { .. } => ClientError::api(200, err.to_string()),
            CloudflareError::RateLimited => ClientError::RateLimited,
            CloudflareError::Auth(_) => ClientError::AuthRequired,
            CloudflareError::ListNotFound(id) => ClientError::not_found(format!("list {id}")),
            CloudflareError::Config(message) => ClientError::Internal { message },
            CloudflareError::Cancelled => ClientError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(message: &str) -> CloudflareError {
        CloudflareError::Rejected {
            errors: vec![ApiMessage {
                code: 1003,
                message: message.to_string(),
            }],
        }
    }

    #[test]
    fn test_is_duplicate() {
        assert!(rejected("Duplicate list item value: C02ABC").is_duplicate());
        assert!(rejected("item already exists").is_duplicate());
        assert!(!rejected("invalid serial number").is_duplicate());

        let api = CloudflareError::Api {
            status: 400,
            message: r#"{"errors":[{"message":"duplicate value"}]}"#.to_string(),
        };
        assert!(api.is_duplicate());
        assert!(!CloudflareError::RateLimited.is_duplicate());
    }

    #[test]
    fn test_is_retryable() {
        assert!(CloudflareError::RateLimited.is_retryable());
        assert!(CloudflareError::Http("reset".to_string()).is_retryable());
        assert!(
            CloudflareError::Api {
                status: 500,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!rejected("nope").is_retryable());
        assert!(!CloudflareError::Cancelled.is_retryable());
    }

    #[test]
    fn test_rejected_display_lists_messages() {
        let err = rejected("invalid serial number");
        assert!(err.to_string().contains("invalid serial number (1003)"));
        let empty = CloudflareError::Rejected { errors: Vec::new() };
        assert!(empty.to_string().contains("no error details"));
    }

    #[test]
    fn test_cloudflare_error_to_client_error() {
        let client_err: ClientError = CloudflareError::ListNotFound("abc".to_string()).into();
        assert!(matches!(client_err, ClientError::NotFound { .. }));

        let client_err: ClientError = CloudflareError::Api {
            status: 403,
            message: "forbidden".to_string(),
        }
        .into();
        assert!(matches!(client_err, ClientError::AuthRequired));

        let client_err: ClientError = CloudflareError::from(HttpError::Cancelled).into();
        assert!(client_err.is_cancelled());
    }
}
