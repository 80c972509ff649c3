//! Progress reporting types for reconciliation passes.
//!
//! The engine never logs directly about pass progress; it emits these events
//! and lets the caller decide how to render them.

use super::engine::filter::RejectReason;
use super::engine::reconcile::ReconcileDiagnostic;
use super::types::CycleSummary;

/// Which mutation a batch event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Addition,
    Removal,
}

impl BatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Removal => "removal",
        }
    }
}

/// Progress events emitted during a reconciliation pass.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A pass has started.
    CycleStarted,

    /// Fetched the directory inventory.
    DevicesFetched {
        /// Number of devices returned.
        total: usize,
    },

    /// A device was rejected by the filter.
    DeviceRejected {
        /// Device serial (may be empty).
        identifier: String,
        reason: RejectReason,
    },

    /// Filtering complete.
    FilterComplete {
        /// Devices admitted.
        eligible: usize,
        /// Devices seen.
        total: usize,
    },

    /// Fetched the target collection.
    TargetFetched {
        collection: String,
        /// Current number of items.
        items: usize,
    },

    /// Merged an auxiliary collection into the source set.
    AuxiliaryMerged {
        collection: String,
        items: usize,
    },

    /// An auxiliary collection could not be read and was skipped.
    AuxiliarySkipped {
        collection: String,
        error: String,
    },

    /// A reconciliation diagnostic (kind mismatch, dropped duplicate, alert).
    Diagnostic(ReconcileDiagnostic),

    /// Plan computed.
    PlanReady {
        additions: usize,
        removals: usize,
    },

    /// Submitting one batch.
    ApplyingBatch {
        kind: BatchKind,
        /// Batch number (1-indexed).
        batch: usize,
        /// Total batches for this mutation.
        batches: usize,
        /// Identifiers in this batch.
        count: usize,
    },

    /// An identifier could not be applied.
    ItemFailed {
        kind: BatchKind,
        identifier: String,
        error: String,
    },

    /// A mutation phase is finished.
    ApplyComplete {
        kind: BatchKind,
        succeeded: usize,
        failed: usize,
    },

    /// The pass finished and produced a summary.
    CycleComplete {
        summary: CycleSummary,
        /// Wall time of the pass in milliseconds.
        elapsed_ms: u64,
    },

    /// The pass aborted before applying changes.
    CycleFailed {
        error: String,
    },

    /// A tick fired while a pass was still running and was dropped.
    TickSkipped,

    /// The shutdown signal was observed by the loop.
    ShutdownRequested {
        /// Whether a pass is still finishing.
        pass_running: bool,
    },
}

/// Callback for progress updates during reconciliation.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
///
/// # Example
///
/// ```ignore
/// use fleetsync::sync::{emit, ProgressCallback, SyncProgress};
///
/// fn report(on_progress: Option<&ProgressCallback>) {
///     emit(on_progress, SyncProgress::DevicesFetched { total: 42 });
/// }
/// ```
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_with_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let callback: ProgressCallback = Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), SyncProgress::DevicesFetched { total: 10 });
        emit(
            Some(&callback),
            SyncProgress::FilterComplete {
                eligible: 5,
                total: 10,
            },
        );

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_without_callback() {
        emit(None, SyncProgress::TickSkipped);
    }

    #[test]
    fn test_sync_progress_debug() {
        let event = SyncProgress::ItemFailed {
            kind: BatchKind::Addition,
            identifier: "C02XYZ".to_string(),
            error: "API error (400): invalid value".to_string(),
        };

        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("ItemFailed"));
        assert!(debug_str.contains("C02XYZ"));
    }

    #[test]
    fn test_batch_kind_as_str() {
        assert_eq!(BatchKind::Addition.as_str(), "addition");
        assert_eq!(BatchKind::Removal.as_str(), "removal");
    }
}
