//! Progress reporting for reconciliation passes.
//!
//! The daemon runs unattended, so every engine event is rendered as a
//! structured `tracing` record. Whether that ends up as text or JSON is
//! decided by the subscriber installed in `main`.

use std::sync::Arc;

use fleetsync::sync::{ProgressCallback, ReconcileDiagnostic, SyncProgress};

/// Logging reporter using tracing for structured output.
#[derive(Debug, Default)]
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    /// Convert to a ProgressCallback for the engine.
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| reporter.handle(event))
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::CycleStarted => {
                tracing::debug!("Reconciliation pass started");
            }

            SyncProgress::DevicesFetched { total } => {
                tracing::info!(total, "Fetched Kandji devices");
            }

            SyncProgress::DeviceRejected { identifier, reason } => {
                tracing::debug!(serial = %identifier, reason = %reason, "Device filtered out");
            }

            SyncProgress::FilterComplete { eligible, total } => {
                tracing::info!(eligible, total, "Filtered devices");
            }

            SyncProgress::TargetFetched { collection, items } => {
                tracing::info!(list_id = %collection, items, "Fetched target list");
            }

            SyncProgress::AuxiliaryMerged { collection, items } => {
                tracing::info!(list_id = %collection, items, "Merged source list");
            }

            SyncProgress::AuxiliarySkipped { collection, error } => {
                tracing::error!(list_id = %collection, error = %error, "Skipped source list");
            }

            SyncProgress::Diagnostic(diagnostic) => log_diagnostic(&diagnostic),

            SyncProgress::PlanReady { additions, removals } => {
                tracing::info!(additions, removals, "Computed reconciliation plan");
            }

            SyncProgress::ApplyingBatch {
                kind,
                batch,
                batches,
                count,
            } => {
                tracing::debug!(kind = kind.as_str(), batch, batches, count, "Submitting batch");
            }

            SyncProgress::ItemFailed {
                kind,
                identifier,
                error,
            } => {
                tracing::error!(
                    kind = kind.as_str(),
                    serial = %identifier,
                    error = %error,
                    "Failed to apply change"
                );
            }

            SyncProgress::ApplyComplete {
                kind,
                succeeded,
                failed,
            } => {
                tracing::info!(kind = kind.as_str(), succeeded, failed, "Applied changes");
            }

            SyncProgress::CycleComplete {
                summary,
                elapsed_ms,
            } => {
                tracing::info!(
                    devices = summary.source_total,
                    eligible = summary.eligible,
                    to_add = summary.additions_proposed,
                    added = summary.additions_applied,
                    to_remove = summary.removals_proposed,
                    removed = summary.removals_applied,
                    alerted = summary.missing_alerted,
                    errors = summary.errors,
                    elapsed_ms,
                    "Reconciliation pass complete"
                );
            }

            SyncProgress::CycleFailed { error } => {
                tracing::error!(error = %error, "Reconciliation pass failed");
            }

            SyncProgress::TickSkipped => {
                tracing::warn!("Previous pass still running, skipping this interval");
            }

            SyncProgress::ShutdownRequested { pass_running } => {
                if pass_running {
                    tracing::info!("Shutdown requested, waiting for the running pass to finish");
                } else {
                    tracing::info!("Shutdown requested");
                }
            }

            _ => {}
        }
    }
}

fn log_diagnostic(diagnostic: &ReconcileDiagnostic) {
    match diagnostic {
        ReconcileDiagnostic::KindMismatch {
            collection,
            expected,
            found,
        } => {
            tracing::error!(
                list_id = %collection,
                expected = %expected,
                found = %found,
                "Source list type does not match the target, ignoring it"
            );
        }
        ReconcileDiagnostic::MissingFromSource { identifier } => {
            tracing::warn!(serial = %identifier, "Item in target list has no source device");
        }
        ReconcileDiagnostic::AlreadyInTarget { identifier } => {
            tracing::debug!(serial = %identifier, "Already in target list");
        }
        ReconcileDiagnostic::DuplicateAddition { identifier } => {
            tracing::debug!(serial = %identifier, "Dropped duplicate addition");
        }
    }
}
