//! The reconciliation engine.
//!
//! [`SyncEngine`] sequences one pass (fetch, filter, reconcile, apply) and
//! drives passes on a fixed interval. It is written against the
//! [`DirectoryClient`] and [`CollectionClient`] traits, so any pair of
//! implementations can be plugged in.
//!
//! # Example
//!
//! ```ignore
//! use fleetsync::sync::{SyncEngine, SyncOptions};
//!
//! let engine = SyncEngine::new(kandji, cloudflare, SyncOptions::new("list-id"))?;
//! let summary = engine.run_once(&cancel).await?;
//! println!("added {} devices", summary.additions_applied);
//! ```

pub mod batch;
pub mod filter;
pub mod reconcile;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{CycleSummary, SyncError, SyncOptions};
use crate::client::{
    ClientError, CollectionClient, CollectionKind, DirectoryClient, short_error_message,
};

use batch::{apply_additions_with_progress, apply_removals_with_progress};
use filter::{DeviceFilter, filter_devices};
use reconcile::{AuxiliarySnapshot, TargetSnapshot, reconcile};

/// Clears the pass flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type PassFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Reconciles a device directory against a target collection.
pub struct SyncEngine<D, C> {
    directory: D,
    collections: C,
    options: SyncOptions,
    filter: DeviceFilter,
    on_progress: Option<ProgressCallback>,
    pass_running: AtomicBool,
}

impl<D: DirectoryClient, C: CollectionClient> SyncEngine<D, C> {
    /// Create an engine, rejecting options that fail [`SyncOptions::validate`].
    pub fn new(directory: D, collections: C, options: SyncOptions) -> Result<Self, SyncError> {
        options.validate()?;
        let filter = DeviceFilter::new(&options.policy);
        Ok(Self {
            directory,
            collections,
            options,
            filter,
            on_progress: None,
            pass_running: AtomicBool::new(false),
        })
    }

    /// Report pass progress to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn collections(&self) -> &C {
        &self.collections
    }

    /// Whether a pass is currently running.
    pub fn is_running(&self) -> bool {
        self.pass_running.load(Ordering::Acquire)
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_ref()
    }

    /// Run a single reconciliation pass.
    ///
    /// Fails with [`SyncError::PassInProgress`] if another pass is running on
    /// this engine. Directory and target collection failures abort the pass
    /// before any change is made; everything else is counted in the summary.
    #[tracing::instrument(skip_all, fields(collection = %self.options.target_collection))]
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<CycleSummary, SyncError> {
        let _guard = PassGuard::acquire(&self.pass_running).ok_or(SyncError::PassInProgress)?;

        let started = Instant::now();
        emit(self.progress(), SyncProgress::CycleStarted);

        match self.run_pass(cancel).await {
            Ok(summary) => {
                emit(
                    self.progress(),
                    SyncProgress::CycleComplete {
                        summary: summary.clone(),
                        elapsed_ms: u64::try_from(started.elapsed().as_millis())
                            .unwrap_or(u64::MAX),
                    },
                );
                Ok(summary)
            }
            Err(err) => {
                emit(
                    self.progress(),
                    SyncProgress::CycleFailed {
                        error: short_error_message(&err),
                    },
                );
                Err(err)
            }
        }
    }

    async fn run_pass(&self, cancel: &CancellationToken) -> Result<CycleSummary, SyncError> {
        let on_progress = self.progress();
        let target_id = self.options.target_collection.as_str();
        let mut summary = CycleSummary::default();

        let devices = self
            .directory
            .list_devices(cancel)
            .await
            .map_err(SyncError::directory)?;
        summary.source_total = devices.len();
        emit(
            on_progress,
            SyncProgress::DevicesFetched {
                total: devices.len(),
            },
        );

        let filtered = filter_devices(&devices, &self.filter);
        for (device, reason) in &filtered.rejected {
            emit(
                on_progress,
                SyncProgress::DeviceRejected {
                    identifier: device.identifier.clone(),
                    reason: *reason,
                },
            );
        }
        summary.eligible = filtered.eligible.len();
        emit(
            on_progress,
            SyncProgress::FilterComplete {
                eligible: summary.eligible,
                total: summary.source_total,
            },
        );

        let target = self.fetch_target(target_id, cancel).await?;
        emit(
            on_progress,
            SyncProgress::TargetFetched {
                collection: target_id.to_string(),
                items: target.items.len(),
            },
        );

        let mut auxiliary_ids: Vec<&str> = self
            .options
            .auxiliary_collections
            .iter()
            .map(String::as_str)
            .collect();
        auxiliary_ids.sort_unstable();

        let mut auxiliary = Vec::with_capacity(auxiliary_ids.len());
        for id in auxiliary_ids {
            match self.fetch_auxiliary(id, &target.kind, cancel).await {
                Ok(snapshot) => {
                    emit(
                        on_progress,
                        SyncProgress::AuxiliaryMerged {
                            collection: id.to_string(),
                            items: snapshot.items.len(),
                        },
                    );
                    auxiliary.push(snapshot);
                }
                Err(err) if err.is_cancelled() => return Err(SyncError::Cancelled),
                Err(err) => {
                    summary.errors += 1;
                    emit(
                        on_progress,
                        SyncProgress::AuxiliarySkipped {
                            collection: id.to_string(),
                            error: short_error_message(&err),
                        },
                    );
                }
            }
        }

        let reconciliation = reconcile(
            &filtered.eligible,
            &auxiliary,
            &target,
            self.options.missing_policy,
        );
        summary.errors += reconciliation.error_count();
        summary.missing_alerted = reconciliation.missing_count();
        for diagnostic in &reconciliation.diagnostics {
            emit(on_progress, SyncProgress::Diagnostic(diagnostic.clone()));
        }

        let plan = reconciliation.plan;
        summary.additions_proposed = plan.additions.len();
        summary.removals_proposed = plan.removals.len();
        emit(
            on_progress,
            SyncProgress::PlanReady {
                additions: summary.additions_proposed,
                removals: summary.removals_proposed,
            },
        );

        // Removals go first so a full collection has room for the additions.
        if !plan.removals.is_empty() {
            let removals: Vec<String> = plan.removals.into_iter().collect();
            let outcome = apply_removals_with_progress(
                &self.collections,
                target_id,
                &removals,
                self.options.batch_size,
                cancel,
                on_progress,
            )
            .await;
            summary.removals_applied = outcome.succeeded;
            summary.errors += outcome.failed();
        }

        if !plan.additions.is_empty() {
            let outcome = apply_additions_with_progress(
                &self.collections,
                target_id,
                &plan.additions,
                self.options.batch_size,
                cancel,
                on_progress,
            )
            .await;
            summary.additions_applied = outcome.succeeded;
            summary.errors += outcome.failed();
        }

        Ok(summary)
    }

    async fn fetch_target(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<TargetSnapshot, SyncError> {
        let kind = self
            .collections
            .collection_kind(id, cancel)
            .await
            .map_err(|e| SyncError::target(id, e))?;
        let items = self
            .collections
            .list_items(id, cancel)
            .await
            .map_err(|e| SyncError::target(id, e))?;
        Ok(TargetSnapshot { kind, items })
    }

    /// Read one auxiliary collection.
    ///
    /// A collection whose kind differs from `expected` is returned without
    /// its items; `reconcile` reports it and leaves it out of the merge.
    async fn fetch_auxiliary(
        &self,
        id: &str,
        expected: &CollectionKind,
        cancel: &CancellationToken,
    ) -> Result<AuxiliarySnapshot, ClientError> {
        let metadata = self.collections.collection_metadata(id, cancel).await?;

        let items = if metadata.kind == *expected {
            self.collections.list_items(id, cancel).await?
        } else {
            Vec::new()
        };

        Ok(AuxiliarySnapshot {
            id: id.to_string(),
            kind: metadata.kind,
            description: metadata.description,
            items,
        })
    }

    /// Run a pass now and then on every `interval` until `cancel` fires.
    ///
    /// Ticks that arrive while a pass is running are dropped. On shutdown the
    /// running pass, if any, is allowed to finish before this returns. Pass
    /// failures are reported through the progress callback and never end the
    /// loop.
    ///
    /// Fails with [`SyncError::InvalidOptions`] if `interval` is zero.
    pub async fn run_forever(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        if interval.is_zero() {
            return Err(SyncError::InvalidOptions(
                "sync interval must be greater than zero".to_string(),
            ));
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<PassFuture<'_>> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    emit(
                        self.progress(),
                        SyncProgress::ShutdownRequested {
                            pass_running: in_flight.is_some(),
                        },
                    );
                    if let Some(pass) = in_flight.take() {
                        pass.await;
                    }
                    return Ok(());
                }

                () = async {
                    match in_flight.as_mut() {
                        Some(pass) => pass.await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                }

                _ = ticker.tick() => {
                    if in_flight.is_some() {
                        emit(self.progress(), SyncProgress::TickSkipped);
                    } else {
                        in_flight = Some(Box::pin(self.scheduled_pass(cancel)));
                    }
                }
            }
        }
    }

    async fn scheduled_pass(&self, cancel: &CancellationToken) {
        // Failures were already reported by `run_once`.
        if let Err(err) = self.run_once(cancel).await {
            tracing::debug!(error = %err, "Scheduled pass ended without a summary");
        }
    }
}
