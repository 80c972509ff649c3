//! Shared retry utilities for the API clients.
//!
//! Throttled (429), server-side (5xx) and transport failures are retried with
//! exponential backoff and jitter. Every attempt goes back through the rate governor, so
//! retries never bypass the request budget. A cancelled token ends the wait
//! between attempts at once.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio_util::sync::CancellationToken;

use crate::client::short_error_message;
use crate::http::HttpError;

/// Initial delay before the first retry, in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Maximum delay between retries, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Maximum retries for a single request.
pub const MAX_RETRIES: usize = 3;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Disable retries entirely.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Execute a request with automatic retry on retryable errors.
///
/// `is_retryable` decides which errors are worth another attempt; `label`
/// identifies the request in debug logs (e.g. `GET /devices`). Once `cancel`
/// fires no further attempt is made and a pending backoff is abandoned.
///
/// # Example
///
/// ```ignore
/// use fleetsync::retry::{RetryConfig, with_retry};
///
/// let items = with_retry(
///     || async { client.fetch_page(page, &cancel).await },
///     ClientError::is_retryable,
///     &RetryConfig::default(),
///     "GET items",
///     &cancel,
/// )
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut>(
    operation: F,
    is_retryable: fn(&E) -> bool,
    config: &RetryConfig,
    label: &str,
    cancel: &CancellationToken,
) -> Result<T, E>
where
    E: std::error::Error + From<HttpError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempt = AtomicU32::new(0);
    let mut operation = operation;

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    let retrying = retry_op
        .retry(config.clone().into_backoff())
        .notify(|err: &E, dur: Duration| {
            tracing::debug!(
                request = label,
                attempt = attempt.load(Ordering::SeqCst),
                retry_in = ?dur,
                error = %short_error_message(err),
                "Retrying request"
            );
        })
        .when(|err| !cancel.is_cancelled() && is_retryable(err));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(E::from(HttpError::Cancelled)),
        result = retrying => result,
    }
}
