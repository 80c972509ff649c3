//! Kandji API client creation and device listing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::convert::to_source_device;
use super::error::KandjiError;
use super::types::KandjiDevice;
use crate::client::{self, ClientError, DirectoryClient, RateGovernor, RatePool, SourceDevice};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{DEFAULT_REQUEST_TIMEOUT, HttpMethod, HttpRequest, HttpTransport, send_cancellable};
use crate::retry::{RetryConfig, with_retry};

/// Devices requested per page.
pub const PAGE_SIZE: usize = 300;

/// Kandji API client.
#[derive(Clone)]
pub struct KandjiClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    token: String,
    governor: RateGovernor,
    retry: RetryConfig,
}

impl KandjiClient {
    /// Create a new Kandji client.
    ///
    /// # Arguments
    ///
    /// * `api_url` - Tenant API URL (e.g., "https://acme.api.kandji.io")
    /// * `token` - API token with device read access
    /// * `governor` - Shared rate governor; requests draw from the directory pool
    pub fn new(api_url: &str, token: &str, governor: RateGovernor) -> Result<Self, KandjiError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| KandjiError::Config(e.to_string()))?;

        Ok(Self::new_with_transport(
            api_url,
            token,
            governor,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        api_url: &str,
        token: &str,
        governor: RateGovernor,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            governor,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn devices_url(&self, offset: usize) -> String {
        format!(
            "{}/api/v1/devices?limit={PAGE_SIZE}&offset={offset}",
            self.api_url
        )
    }

    /// Fetch one page of devices.
    async fn get_page(
        &self,
        offset: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<KandjiDevice>, KandjiError> {
        self.governor
            .acquire(RatePool::Directory, cancel)
            .await
            .map_err(|_| KandjiError::Cancelled)?;

        let request = HttpRequest::json(
            HttpMethod::Get,
            self.devices_url(offset),
            &self.token,
            Vec::new(),
        );
        let response = send_cancellable(self.transport.as_ref(), request, cancel).await?;

        match response.status {
            200..=299 => Ok(serde_json::from_slice(&response.body)?),
            401 | 403 => Err(KandjiError::Auth(response.body_text())),
            429 => Err(KandjiError::RateLimited),
            status => Err(KandjiError::Api {
                status,
                message: response.body_text(),
            }),
        }
    }
}

#[async_trait]
impl DirectoryClient for KandjiClient {
    #[tracing::instrument(skip_all, fields(api_url = %self.api_url))]
    async fn list_devices(&self, cancel: &CancellationToken) -> client::Result<Vec<SourceDevice>> {
        let mut devices = Vec::new();
        let mut offset = 0;

        loop {
            let page = with_retry(
                || async {
                    self.get_page(offset, cancel)
                        .await
                        .map_err(ClientError::from)
                },
                ClientError::is_retryable,
                &self.retry,
                "GET /api/v1/devices",
                cancel,
            )
            .await?;

            let count = page.len();
            devices.extend(page.into_iter().map(to_source_device));
            tracing::debug!(offset, count, total = devices.len(), "Fetched Kandji device page");

            if count < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(devices)
    }
}
