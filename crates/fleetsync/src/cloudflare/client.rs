//! Cloudflare Gateway list client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::error::CloudflareError;
use super::types::{Envelope, GatewayList, GatewayListItem, PatchListRequest};
use crate::client::{
    self, BatchReport, ClientError, CollectionClient, CollectionKind, CollectionMetadata,
    ItemFailure, NewItem, RateGovernor, RatePool, TargetItem, short_error_message,
};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{DEFAULT_REQUEST_TIMEOUT, HttpMethod, HttpRequest, HttpTransport, send_cancellable};
use crate::retry::{RetryConfig, with_retry};

/// Cloudflare v4 API base URL.
pub const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Items requested per page (the API maximum).
pub const ITEMS_PER_PAGE: usize = 1000;

const EMPTY_VALUE: &str = "empty identifier";

/// Cloudflare Zero Trust Gateway list client.
#[derive(Clone)]
pub struct CloudflareClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    account_id: String,
    token: String,
    governor: RateGovernor,
    retry: RetryConfig,
}

impl CloudflareClient {
    /// Create a new Cloudflare client.
    ///
    /// # Arguments
    ///
    /// * `account_id` - Cloudflare account owning the lists
    /// * `token` - API token with Zero Trust edit access
    /// * `governor` - Shared rate governor; requests draw from the collection pool
    pub fn new(
        account_id: &str,
        token: &str,
        governor: RateGovernor,
    ) -> Result<Self, CloudflareError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| CloudflareError::Config(e.to_string()))?;

        Ok(Self::new_with_transport(
            account_id,
            token,
            governor,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        account_id: &str,
        token: &str,
        governor: RateGovernor,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            base_url: API_BASE.to_string(),
            account_id: account_id.to_string(),
            token: token.to_string(),
            governor,
            retry: RetryConfig::default(),
        }
    }

    /// Point the client at a different API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the account ID.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn list_url(&self, list_id: &str) -> String {
        format!(
            "{}/accounts/{}/gateway/lists/{list_id}",
            self.base_url, self.account_id
        )
    }

    /// Send one request and unwrap the response envelope.
    async fn send_once<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: &str,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Option<T>, CloudflareError> {
        self.governor
            .acquire(RatePool::Collection, cancel)
            .await
            .map_err(|_| CloudflareError::Cancelled)?;

        let request = HttpRequest::json(method, url, &self.token, body.to_vec());
        let response = send_cancellable(self.transport.as_ref(), request, cancel).await?;

        match response.status {
            200..=299 => {}
            401 | 403 => return Err(CloudflareError::Auth(response.body_text())),
            429 => return Err(CloudflareError::RateLimited),
            status => {
                return Err(CloudflareError::Api {
                    status,
                    message: response.body_text(),
                });
            }
        }

        let envelope: Envelope<T> = serde_json::from_slice(&response.body)?;
        if !envelope.success {
            return Err(CloudflareError::Rejected {
                errors: envelope.errors,
            });
        }
        Ok(envelope.result)
    }

    /// [`Self::send_once`] with retry on throttling and server errors.
    async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: &str,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Option<T>, CloudflareError> {
        let label = format!("{} {url}", method.as_str());
        with_retry(
            || async { self.send_once(method, url, body, cancel).await },
            CloudflareError::is_retryable,
            &self.retry,
            &label,
            cancel,
        )
        .await
    }

    async fn get_list(
        &self,
        list_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GatewayList, CloudflareError> {
        self.request(HttpMethod::Get, &self.list_url(list_id), &[], cancel)
            .await?
            .ok_or_else(|| CloudflareError::ListNotFound(list_id.to_string()))
    }

    async fn patch(
        &self,
        list_id: &str,
        body: &PatchListRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), CloudflareError> {
        let body = serde_json::to_vec(body)?;
        self.request::<serde_json::Value>(HttpMethod::Patch, &self.list_url(list_id), &body, cancel)
            .await
            .map(|_| ())
    }

    /// Append items one at a time, treating duplicates as already applied.
    async fn append_one_by_one(
        &self,
        list_id: &str,
        items: &[NewItem],
        cancel: &CancellationToken,
        report: &mut BatchReport,
    ) {
        for (index, item) in items.iter().enumerate() {
            let body = PatchListRequest::append(std::slice::from_ref(item));
            match self.patch(list_id, &body, cancel).await {
                Ok(()) => {}
                Err(err) if err.is_duplicate() => {
                    tracing::debug!(value = %item.value, "Value already in list");
                }
                Err(err) if err.is_cancelled() => {
                    let message = short_error_message(&ClientError::Cancelled);
                    report.rejected.extend(
                        items[index..]
                            .iter()
                            .map(|rest| ItemFailure::new(&rest.value, &message)),
                    );
                    return;
                }
                Err(err) => report
                    .rejected
                    .push(ItemFailure::new(&item.value, short_error_message(&err))),
            }
        }
    }
}

/// Split out empty values, which are never sent.
fn reject_empty<T: Clone>(items: &[T], value: fn(&T) -> &str) -> (Vec<T>, Vec<ItemFailure>) {
    let mut valid = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for item in items {
        if value(item).trim().is_empty() {
            rejected.push(ItemFailure::new(value(item), EMPTY_VALUE));
        } else {
            valid.push(item.clone());
        }
    }
    (valid, rejected)
}

fn new_item_value(item: &NewItem) -> &str {
    &item.value
}

#[async_trait]
impl CollectionClient for CloudflareClient {
    async fn collection_metadata(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> client::Result<CollectionMetadata> {
        let list = self.get_list(collection_id, cancel).await?;
        Ok(CollectionMetadata {
            id: list.id,
            name: list.name,
            description: list.description.unwrap_or_default(),
            kind: CollectionKind::new(list.kind),
        })
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn list_items(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> client::Result<Vec<TargetItem>> {
        let mut items = Vec::new();
        let mut page = 1usize;

        loop {
            let url = format!(
                "{}/items?page={page}&per_page={ITEMS_PER_PAGE}",
                self.list_url(collection_id)
            );
            let batch: Vec<GatewayListItem> = self
                .request(HttpMethod::Get, &url, &[], cancel)
                .await?
                .unwrap_or_default();

            let count = batch.len();
            items.extend(batch.into_iter().map(|item| TargetItem {
                value: item.value,
                comment: item.comment,
                created_at: item.created_at,
                updated_at: item.updated_at,
            }));
            tracing::debug!(page, count, total = items.len(), "Fetched Gateway list items");

            if count < ITEMS_PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(items)
    }

    async fn append_items(
        &self,
        collection_id: &str,
        items: &[NewItem],
        cancel: &CancellationToken,
    ) -> client::Result<BatchReport> {
        let (valid, rejected) = reject_empty(items, new_item_value);
        let mut report = BatchReport { rejected };
        if valid.is_empty() {
            return Ok(report);
        }

        match self
            .patch(collection_id, &PatchListRequest::append(&valid), cancel)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_duplicate() && valid.len() == 1 => {}
            Err(err) if err.is_duplicate() => {
                tracing::debug!(
                    count = valid.len(),
                    "Append batch rejected for a duplicate, retrying item by item"
                );
                self.append_one_by_one(collection_id, &valid, cancel, &mut report)
                    .await;
            }
            Err(err) => return Err(err.into()),
        }

        Ok(report)
    }

    async fn remove_items(
        &self,
        collection_id: &str,
        values: &[String],
        cancel: &CancellationToken,
    ) -> client::Result<BatchReport> {
        let (valid, rejected) = reject_empty(values, String::as_str);
        if !valid.is_empty() {
            self.patch(collection_id, &PatchListRequest::remove(&valid), cancel)
                .await?;
        }
        Ok(BatchReport { rejected })
    }

    async fn validate_exists(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> client::Result<()> {
        let list = self.get_list(collection_id, cancel).await?;

        tracing::info!(
            list_id = %collection_id,
            list_name = %list.name,
            list_type = %list.kind,
            "Validated Cloudflare Gateway list"
        );
        if list.kind != CollectionKind::SERIAL {
            tracing::warn!(
                list_id = %collection_id,
                list_type = %list.kind,
                "Gateway list is not of type SERIAL; device serial sync may not work as expected"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RateBudget;
    use crate::http::{MockTransport, header_get};
    use std::time::Duration;

    const ACCOUNT: &str = "acct-1";

    fn governor() -> RateGovernor {
        RateGovernor::new(RateBudget::new(1000.0, 100), RateBudget::new(1000.0, 100)).unwrap()
    }

    fn client(transport: &MockTransport) -> CloudflareClient {
        CloudflareClient::new_with_transport(ACCOUNT, "cf-token", governor(), Arc::new(transport.clone()))
            .with_retry_config(
                RetryConfig::new(Duration::from_millis(1), Duration::from_millis(2), 2)
                    .with_jitter(false),
            )
    }

    fn list_url(id: &str) -> String {
        format!("{API_BASE}/accounts/{ACCOUNT}/gateway/lists/{id}")
    }

    fn items_url(id: &str, page: usize) -> String {
        format!("{}/items?page={page}&per_page={ITEMS_PER_PAGE}", list_url(id))
    }

    fn ok(result: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"success": true, "errors": [], "messages": [], "result": result})
    }

    fn list_json(id: &str, kind: &str, description: Option<&str>) -> serde_json::Value {
        ok(serde_json::json!({
            "id": id,
            "name": "Managed devices",
            "description": description,
            "type": kind,
            "count": 0
        }))
    }

    fn duplicate_rejection() -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "errors": [{"code": 2002, "message": "duplicate value in list"}],
            "result": null
        })
    }

    #[tokio::test]
    async fn test_collection_metadata() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            list_url("list-1"),
            200,
            list_json("list-1", "SERIAL", None),
        );

        let cancel = CancellationToken::new();
        let metadata = client(&transport)
            .collection_metadata("list-1", &cancel)
            .await
            .unwrap();

        assert_eq!(metadata.id, "list-1");
        assert_eq!(metadata.description, "");
        assert!(metadata.kind.is_serial());
        assert_eq!(
            header_get(&transport.requests()[0].headers, "authorization"),
            Some("Bearer cf-token")
        );
    }

    #[tokio::test]
    async fn test_collection_kind_uses_list_type() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            list_url("list-2"),
            200,
            list_json("list-2", "DOMAIN", Some("Domains")),
        );

        let cancel = CancellationToken::new();
        let kind = client(&transport)
            .collection_kind("list-2", &cancel)
            .await
            .unwrap();
        assert_eq!(kind.as_str(), "DOMAIN");
    }

    #[tokio::test]
    async fn test_missing_list_is_not_found() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            list_url("gone"),
            404,
            serde_json::json!({"success": false, "errors": [{"code": 1404, "message": "not found"}]}),
        );

        let cancel = CancellationToken::new();
        let err = client(&transport)
            .validate_exists("gone", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_exists_accepts_non_serial_list() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            list_url("list-3"),
            200,
            list_json("list-3", "EMAIL", None),
        );

        let cancel = CancellationToken::new();
        assert!(client(&transport).validate_exists("list-3", &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_items_paginates_until_short_page() {
        let transport = MockTransport::new();
        let full: Vec<serde_json::Value> = (0..ITEMS_PER_PAGE)
            .map(|i| serde_json::json!({"value": format!("S{i:05}"), "created_at": "2024-01-01T00:00:00Z"}))
            .collect();
        transport.push_json(HttpMethod::Get, items_url("list-1", 1), 200, ok(serde_json::json!(full)));
        transport.push_json(
            HttpMethod::Get,
            items_url("list-1", 2),
            200,
            ok(serde_json::json!([{"value": "LAST", "comment": "Bob's Mac"}])),
        );

        let cancel = CancellationToken::new();
        let items = client(&transport).list_items("list-1", &cancel).await.unwrap();

        assert_eq!(items.len(), ITEMS_PER_PAGE + 1);
        assert_eq!(items[ITEMS_PER_PAGE].value, "LAST");
        assert_eq!(items[ITEMS_PER_PAGE].comment.as_deref(), Some("Bob's Mac"));
        assert!(items[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_list_items_empty_list_has_null_result() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            items_url("list-1", 1),
            200,
            ok(serde_json::Value::Null),
        );

        let cancel = CancellationToken::new();
        let items = client(&transport).list_items("list-1", &cancel).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_list_items_retries_throttling() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, items_url("list-1", 1), 429, serde_json::json!({}));
        transport.push_json(
            HttpMethod::Get,
            items_url("list-1", 1),
            200,
            ok(serde_json::json!([{"value": "A"}])),
        );

        let cancel = CancellationToken::new();
        let items = client(&transport).list_items("list-1", &cancel).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_append_items_sends_patch_append() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Patch, list_url("list-1"), 200, list_json("list-1", "SERIAL", None));

        let cancel = CancellationToken::new();
        let items = vec![NewItem::new("A", "Alice's Mac"), NewItem::new("B", "")];
        let report = client(&transport)
            .append_items("list-1", &items, &cancel)
            .await
            .unwrap();

        assert!(report.rejected.is_empty());
        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Patch);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"append": [
                {"value": "A", "comment": "Alice's Mac"},
                {"value": "B", "comment": ""}
            ]})
        );
    }

    #[tokio::test]
    async fn test_append_items_rejects_empty_values_without_sending() {
        let transport = MockTransport::new();
        let cancel = CancellationToken::new();

        let report = client(&transport)
            .append_items("list-1", &[NewItem::new("  ", "blank")], &cancel)
            .await
            .unwrap();

        assert_eq!(report.rejected, vec![ItemFailure::new("  ", EMPTY_VALUE)]);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_append_duplicate_falls_back_to_single_items() {
        let transport = MockTransport::new();
        let url = list_url("list-1");
        transport.push_json(HttpMethod::Patch, url.clone(), 400, duplicate_rejection());
        // A succeeds, B is already present, C is invalid.
        transport.push_json(HttpMethod::Patch, url.clone(), 200, list_json("list-1", "SERIAL", None));
        transport.push_json(HttpMethod::Patch, url.clone(), 200, duplicate_rejection());
        transport.push_json(
            HttpMethod::Patch,
            url.clone(),
            400,
            serde_json::json!({"success": false, "errors": [{"code": 1001, "message": "invalid serial"}]}),
        );

        let cancel = CancellationToken::new();
        let items = vec![
            NewItem::new("A", ""),
            NewItem::new("B", ""),
            NewItem::new("C", ""),
        ];
        let report = client(&transport)
            .append_items("list-1", &items, &cancel)
            .await
            .unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].identifier, "C");
        assert!(report.rejected[0].error.contains("invalid serial"));
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_append_single_duplicate_is_a_no_op() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Patch, list_url("list-1"), 200, duplicate_rejection());

        let cancel = CancellationToken::new();
        let report = client(&transport)
            .append_items("list-1", &[NewItem::new("A", "")], &cancel)
            .await
            .unwrap();

        assert!(report.rejected.is_empty());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_append_failure_is_batch_error() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Patch,
            list_url("list-1"),
            403,
            serde_json::json!({"success": false}),
        );

        let cancel = CancellationToken::new();
        let err = client(&transport)
            .append_items("list-1", &[NewItem::new("A", "")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthRequired));
    }

    #[tokio::test]
    async fn test_remove_items_sends_patch_remove() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Patch, list_url("list-1"), 200, list_json("list-1", "SERIAL", None));

        let cancel = CancellationToken::new();
        let values = vec!["Z".to_string(), String::new()];
        let report = client(&transport)
            .remove_items("list-1", &values, &cancel)
            .await
            .unwrap();

        assert_eq!(report.rejected.len(), 1);
        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).unwrap();
        assert_eq!(body, serde_json::json!({"remove": ["Z"]}));
    }

    #[tokio::test]
    async fn test_requests_fail_fast_when_cancelled() {
        let transport = MockTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client(&transport)
            .list_items("list-1", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(transport.requests().is_empty());
    }
}
