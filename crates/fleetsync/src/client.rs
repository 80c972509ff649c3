//! Capability interfaces for the two external services.
//!
//! This module defines the `DirectoryClient` and `CollectionClient` traits the
//! sync engine is written against, the shared domain types they exchange, and
//! the two-pool `RateGovernor` every outbound request goes through.
//!
//! # Example
//!
//! ```ignore
//! use fleetsync::client::{CollectionClient, DirectoryClient};
//!
//! async fn count<D: DirectoryClient, C: CollectionClient>(
//!     directory: &D,
//!     collections: &C,
//!     list_id: &str,
//!     cancel: &CancellationToken,
//! ) -> Result<(usize, usize), ClientError> {
//!     let devices = directory.list_devices(cancel).await?;
//!     let items = collections.list_items(list_id, cancel).await?;
//!     Ok((devices.len(), items.len()))
//! }
//! ```

mod errors;
mod rate_limit;
mod types;

pub use errors::{ClientError, Result, short_error_message};
pub use rate_limit::{RateBudget, RateBudgetError, RateGovernor, RatePool, rate_limits};
pub use types::{
    ApplyOutcome, Assignment, BatchReport, CollectionClient, CollectionKind, CollectionMetadata,
    DirectoryClient, ItemFailure, NewItem, PlatformClass, SourceDevice, TargetItem,
};
