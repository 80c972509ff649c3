//! Batched application of additions and removals.

use std::future::Future;
use std::num::NonZeroUsize;

use tokio_util::sync::CancellationToken;

use crate::client::{
    ApplyOutcome, BatchReport, ClientError, CollectionClient, ItemFailure, NewItem, Result,
    short_error_message,
};
use crate::sync::progress::{BatchKind, ProgressCallback, SyncProgress, emit};

/// Split `items` into contiguous batches of at most `batch_size`.
///
/// Yields `ceil(len / batch_size)` batches covering every item exactly once.
pub fn partition<T>(items: &[T], batch_size: NonZeroUsize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.get())
}

fn new_item_value(item: &NewItem) -> &str {
    &item.value
}

/// Add `items` to a collection, one request per batch.
pub async fn apply_additions<C: CollectionClient + ?Sized>(
    client: &C,
    collection_id: &str,
    items: &[NewItem],
    batch_size: NonZeroUsize,
    cancel: &CancellationToken,
) -> ApplyOutcome {
    apply_additions_with_progress(client, collection_id, items, batch_size, cancel, None).await
}

/// Remove `values` from a collection, one request per batch.
pub async fn apply_removals<C: CollectionClient + ?Sized>(
    client: &C,
    collection_id: &str,
    values: &[String],
    batch_size: NonZeroUsize,
    cancel: &CancellationToken,
) -> ApplyOutcome {
    apply_removals_with_progress(client, collection_id, values, batch_size, cancel, None).await
}

/// [`apply_additions`], reporting each batch and failure.
pub async fn apply_additions_with_progress<C: CollectionClient + ?Sized>(
    client: &C,
    collection_id: &str,
    items: &[NewItem],
    batch_size: NonZeroUsize,
    cancel: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
) -> ApplyOutcome {
    apply_batches(
        items,
        batch_size,
        BatchKind::Addition,
        cancel,
        on_progress,
        new_item_value,
        |batch| client.append_items(collection_id, batch, cancel),
    )
    .await
}

/// [`apply_removals`], reporting each batch and failure.
pub async fn apply_removals_with_progress<C: CollectionClient + ?Sized>(
    client: &C,
    collection_id: &str,
    values: &[String],
    batch_size: NonZeroUsize,
    cancel: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
) -> ApplyOutcome {
    apply_batches(
        values,
        batch_size,
        BatchKind::Removal,
        cancel,
        on_progress,
        String::as_str,
        |batch| client.remove_items(collection_id, batch, cancel),
    )
    .await
}

/// Submit batches sequentially and aggregate their outcomes.
///
/// A failed request fails every item of its batch; later batches still run.
/// Once `cancel` fires, remaining batches are failed without being sent.
async fn apply_batches<'a, T, F, Fut>(
    items: &'a [T],
    batch_size: NonZeroUsize,
    kind: BatchKind,
    cancel: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
    identifier: fn(&T) -> &str,
    mut submit: F,
) -> ApplyOutcome
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<BatchReport>>,
{
    let mut outcome = ApplyOutcome::default();
    let batches: Vec<&'a [T]> = partition(items, batch_size).collect();
    let total = batches.len();

    for (index, batch) in batches.into_iter().enumerate() {
        let number = index + 1;

        if cancel.is_cancelled() {
            let message = short_error_message(&ClientError::Cancelled);
            outcome.batch_errors.push(format!(
                "{} batch {number}/{total} not sent: {message}",
                kind.as_str()
            ));
            fail_batch(&mut outcome, batch, identifier, &message, kind, on_progress);
            continue;
        }

        emit(
            on_progress,
            SyncProgress::ApplyingBatch {
                kind,
                batch: number,
                batches: total,
                count: batch.len(),
            },
        );
        outcome.batches += 1;

        match submit(batch).await {
            Ok(report) => {
                outcome.succeeded += batch.len().saturating_sub(report.rejected.len());
                for failure in report.rejected {
                    emit(
                        on_progress,
                        SyncProgress::ItemFailed {
                            kind,
                            identifier: failure.identifier.clone(),
                            error: failure.error.clone(),
                        },
                    );
                    outcome.failures.push(failure);
                }
            }
            Err(err) => {
                let message = short_error_message(&err);
                tracing::debug!(
                    kind = kind.as_str(),
                    batch = number,
                    batches = total,
                    error = %message,
                    "Batch request failed"
                );
                outcome.batch_errors.push(format!(
                    "{} batch {number}/{total} failed: {message}",
                    kind.as_str()
                ));
                fail_batch(&mut outcome, batch, identifier, &message, kind, on_progress);
            }
        }
    }

    emit(
        on_progress,
        SyncProgress::ApplyComplete {
            kind,
            succeeded: outcome.succeeded,
            failed: outcome.failed(),
        },
    );

    outcome
}

fn fail_batch<T>(
    outcome: &mut ApplyOutcome,
    batch: &[T],
    identifier: fn(&T) -> &str,
    message: &str,
    kind: BatchKind,
    on_progress: Option<&ProgressCallback>,
) {
    for item in batch {
        let id = identifier(item);
        emit(
            on_progress,
            SyncProgress::ItemFailed {
                kind,
                identifier: id.to_string(),
                error: message.to_string(),
            },
        );
        outcome.failures.push(ItemFailure::new(id, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::client::{CollectionKind, CollectionMetadata, TargetItem};

    #[derive(Default)]
    struct RecordingCollection {
        members: Mutex<BTreeSet<String>>,
        append_calls: Mutex<Vec<Vec<String>>>,
        remove_calls: Mutex<Vec<Vec<String>>>,
        /// 1-indexed append call that fails at the transport level.
        fail_append_call: Option<usize>,
        /// Values rejected individually.
        reject_values: Vec<String>,
        /// Cancel this token after the given append call.
        cancel_after: Option<(usize, CancellationToken)>,
    }

    #[async_trait]
    impl CollectionClient for RecordingCollection {
        async fn collection_metadata(
            &self,
            collection_id: &str,
            _cancel: &CancellationToken,
        ) -> Result<CollectionMetadata> {
            Ok(CollectionMetadata {
                id: collection_id.to_string(),
                name: "Devices".to_string(),
                description: String::new(),
                kind: CollectionKind::from(CollectionKind::SERIAL),
            })
        }

        async fn list_items(
            &self,
            _collection_id: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<TargetItem>> {
            let members = self.members.lock().unwrap();
            Ok(members.iter().map(TargetItem::new).collect())
        }

        async fn append_items(
            &self,
            _collection_id: &str,
            items: &[NewItem],
            _cancel: &CancellationToken,
        ) -> Result<BatchReport> {
            let call = {
                let mut calls = self.append_calls.lock().unwrap();
                calls.push(items.iter().map(|i| i.value.clone()).collect());
                calls.len()
            };
            if let Some((after, token)) = &self.cancel_after
                && *after == call
            {
                token.cancel();
            }
            if self.fail_append_call == Some(call) {
                return Err(ClientError::network("connection reset"));
            }

            let mut report = BatchReport::default();
            let mut members = self.members.lock().unwrap();
            for item in items {
                if self.reject_values.contains(&item.value) {
                    report
                        .rejected
                        .push(ItemFailure::new(&item.value, "invalid serial"));
                } else {
                    members.insert(item.value.clone());
                }
            }
            Ok(report)
        }

        async fn remove_items(
            &self,
            _collection_id: &str,
            values: &[String],
            _cancel: &CancellationToken,
        ) -> Result<BatchReport> {
            self.remove_calls.lock().unwrap().push(values.to_vec());
            let mut members = self.members.lock().unwrap();
            for value in values {
                members.remove(value);
            }
            Ok(BatchReport::default())
        }
    }

    fn items(values: &[&str]) -> Vec<NewItem> {
        values.iter().map(|v| NewItem::new(*v, "")).collect()
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn partition_covers_input_exactly_once() {
        for n in 0..12usize {
            for b in 1..5usize {
                let input: Vec<usize> = (0..n).collect();
                let batches: Vec<&[usize]> = partition(&input, size(b)).collect();

                assert_eq!(batches.len(), n.div_ceil(b));
                assert!(batches.iter().all(|batch| batch.len() <= b && !batch.is_empty()));
                let flattened: Vec<usize> = batches.concat();
                assert_eq!(flattened, input);
            }
        }
    }

    #[tokio::test]
    async fn additions_are_sent_in_bounded_batches() {
        let client = RecordingCollection::default();
        let cancel = CancellationToken::new();

        let outcome =
            apply_additions(&client, "list", &items(&["A", "B", "C"]), size(2), &cancel).await;

        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.batches, 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(
            *client.append_calls.lock().unwrap(),
            vec![vec!["A".to_string(), "B".to_string()], vec!["C".to_string()]]
        );
    }

    #[tokio::test]
    async fn item_rejections_are_captured_individually() {
        let client = RecordingCollection {
            reject_values: vec!["B".to_string()],
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let outcome =
            apply_additions(&client, "list", &items(&["A", "B", "C"]), size(3), &cancel).await;

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failures, vec![ItemFailure::new("B", "invalid serial")]);
        assert!(outcome.batch_errors.is_empty());
    }

    #[tokio::test]
    async fn batch_failure_is_attributed_to_every_item_and_later_batches_run() {
        let client = RecordingCollection {
            fail_append_call: Some(1),
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let outcome =
            apply_additions(&client, "list", &items(&["A", "B", "C"]), size(2), &cancel).await;

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.batches, 2);
        let failed: Vec<&str> = outcome
            .failures
            .iter()
            .map(|f| f.identifier.as_str())
            .collect();
        assert_eq!(failed, ["A", "B"]);
        assert_eq!(outcome.batch_errors.len(), 1);
        assert!(outcome.batch_errors[0].contains("connection reset"));
        assert!(client.members.lock().unwrap().contains("C"));
    }

    #[tokio::test]
    async fn cancellation_fails_remaining_batches_without_sending() {
        let cancel = CancellationToken::new();
        let client = RecordingCollection {
            cancel_after: Some((1, cancel.clone())),
            ..Default::default()
        };

        let outcome = apply_additions(
            &client,
            "list",
            &items(&["A", "B", "C", "D", "E"]),
            size(2),
            &cancel,
        )
        .await;

        assert_eq!(client.append_calls.lock().unwrap().len(), 1);
        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed(), 3);
        assert_eq!(outcome.batch_errors.len(), 2);
        assert!(outcome.batch_errors[0].contains("not sent"));
    }

    #[tokio::test]
    async fn reapplying_is_a_no_op() {
        let client = RecordingCollection::default();
        let cancel = CancellationToken::new();
        let batch = items(&["A", "B"]);

        let first = client.apply_additions("list", &batch, size(10), &cancel).await;
        let second = client.apply_additions("list", &batch, size(10), &cancel).await;

        assert_eq!(first.succeeded, 2);
        assert_eq!(second.succeeded, 2);
        assert!(second.failures.is_empty());
        assert_eq!(client.members.lock().unwrap().len(), 2);

        let absent = vec!["Z".to_string()];
        let removed = client.apply_removals("list", &absent, size(10), &cancel).await;
        assert_eq!(removed.succeeded, 1);
        assert!(removed.failures.is_empty());
    }

    #[tokio::test]
    async fn empty_input_sends_nothing() {
        let client = RecordingCollection::default();
        let cancel = CancellationToken::new();

        let outcome = apply_removals(&client, "list", &[], size(5), &cancel).await;

        assert_eq!(outcome, ApplyOutcome::default());
        assert!(client.remove_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn progress_reports_each_batch() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let client = RecordingCollection::default();
        let cancel = CancellationToken::new();
        let batches_seen = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&batches_seen);
        let callback: ProgressCallback = Box::new(move |event| {
            if matches!(event, SyncProgress::ApplyingBatch { .. }) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let values: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        apply_removals_with_progress(&client, "list", &values, size(1), &cancel, Some(&callback))
            .await;

        assert_eq!(batches_seen.load(Ordering::SeqCst), 3);
    }
}
