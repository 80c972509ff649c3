//! Device allow-list reconciliation.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `SyncOptions`, `FilterPolicy`, `MissingPolicy`, `CycleSummary`
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`engine`] - The `SyncEngine`, plus the filter, reconciler and batch applier it drives
//!
//! # Example
//!
//! ```ignore
//! use fleetsync::sync::{MissingPolicy, SyncEngine, SyncOptions};
//!
//! let mut options = SyncOptions::new("target-list-id");
//! options.missing_policy = MissingPolicy::Delete;
//!
//! let engine = SyncEngine::new(directory, collections, options)?;
//! engine.run_forever(Duration::from_secs(300), &cancel).await?;
//! ```

pub mod engine;
mod progress;
mod types;

// Re-export types
pub use types::{
    BlueprintFilter, CycleSummary, FilterPolicy, IdentifierSet, MissingPolicy,
    ParseMissingPolicyError, SyncError, SyncOptions,
};

// Re-export constants
pub use types::DEFAULT_BATCH_SIZE;

// Re-export progress types
pub use progress::{BatchKind, ProgressCallback, SyncProgress, emit};

// Re-export engine items for convenience
pub use engine::SyncEngine;
pub use engine::batch::partition;
pub use engine::filter::{DeviceFilter, FilterOutcome, RejectReason, filter_devices};
pub use engine::reconcile::{
    AuxiliarySnapshot, ReconcileDiagnostic, Reconciliation, ReconciliationPlan, TargetSnapshot,
    reconcile,
};
