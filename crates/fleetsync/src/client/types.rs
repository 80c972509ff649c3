use std::fmt;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::sync::engine::batch;

use super::errors::Result;

/// Platform class of a managed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformClass {
    Desktop,
    Mobile,
}

impl PlatformClass {
    /// Classify a directory platform string.
    ///
    /// `iPhone` and `iPad` are mobile; every other platform (Mac, AppleTV,
    /// unknown values) is treated as desktop.
    pub fn from_platform(platform: &str) -> Self {
        match platform {
            "iPhone" | "iPad" => Self::Mobile,
            _ => Self::Desktop,
        }
    }

    #[inline]
    pub fn is_mobile(self) -> bool {
        self == Self::Mobile
    }
}

/// Blueprint assignment of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub blueprint_id: String,
    pub blueprint_name: String,
}

/// A device as reported by the directory.
///
/// This is a transient view rebuilt on every pass; it is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDevice {
    /// Serial number. Must be non-empty to be eligible.
    pub identifier: String,
    /// Human-readable device name, used as the allow-list comment.
    pub display_name: String,
    /// Email of the assigned user; empty when unassigned.
    pub owner_email: String,
    pub platform: PlatformClass,
    /// Free-form directory tags.
    pub tags: Vec<String>,
    pub assignment: Assignment,
}

impl SourceDevice {
    /// Whether the device has an assigned owner.
    #[inline]
    pub fn is_owned(&self) -> bool {
        !self.owner_email.is_empty()
    }
}

/// Item kind of an access-control collection (e.g. `SERIAL`, `DOMAIN`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionKind(String);

impl CollectionKind {
    /// Kind used for device serial number lists.
    pub const SERIAL: &'static str = "SERIAL";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_serial(&self) -> bool {
        self.0 == Self::SERIAL
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// Descriptive metadata for a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMetadata {
    pub id: String,
    pub name: String,
    /// May be empty; an empty description is still a valid comment.
    pub description: String,
    pub kind: CollectionKind,
}

/// A member of an access-control collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetItem {
    /// Unique within its collection.
    pub value: String,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TargetItem {
    /// Create an item with only a value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            comment: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// An item proposed for addition to a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewItem {
    pub value: String,
    pub comment: String,
}

impl NewItem {
    pub fn new(value: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            comment: comment.into(),
        }
    }
}

/// A single identifier that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub identifier: String,
    pub error: String,
}

impl ItemFailure {
    pub fn new(identifier: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            error: error.into(),
        }
    }
}

/// Result of submitting one batch.
///
/// Items not listed in `rejected` were applied (or were already in the
/// requested state).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub rejected: Vec<ItemFailure>,
}

/// Aggregate outcome of applying a sequence of batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Identifiers applied successfully.
    pub succeeded: usize,
    /// Per-identifier failures in submission order.
    pub failures: Vec<ItemFailure>,
    /// Failures that affected a whole batch.
    pub batch_errors: Vec<String>,
    /// Number of batches dispatched.
    pub batches: usize,
}

impl ApplyOutcome {
    /// Number of identifiers that failed.
    #[inline]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// The authoritative device inventory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// List every managed device. Pagination is handled by the client.
    async fn list_devices(&self, cancel: &CancellationToken) -> Result<Vec<SourceDevice>>;
}

/// The access-control service holding the allow-list collections.
///
/// Implementors provide the per-batch primitives; `apply_additions` and
/// `apply_removals` partition the input and aggregate outcomes on top of them.
#[async_trait]
pub trait CollectionClient: Send + Sync {
    /// Fetch a collection's metadata.
    async fn collection_metadata(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CollectionMetadata>;

    /// Fetch a collection's item kind.
    async fn collection_kind(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CollectionKind> {
        Ok(self.collection_metadata(collection_id, cancel).await?.kind)
    }

    /// List every item of a collection, following pagination.
    async fn list_items(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TargetItem>>;

    /// Submit one addition batch as a single request.
    ///
    /// Adding a value that is already present must be a no-op.
    async fn append_items(
        &self,
        collection_id: &str,
        items: &[NewItem],
        cancel: &CancellationToken,
    ) -> Result<BatchReport>;

    /// Submit one removal batch as a single request.
    ///
    /// Removing a value that is absent must be a no-op.
    async fn remove_items(
        &self,
        collection_id: &str,
        values: &[String],
        cancel: &CancellationToken,
    ) -> Result<BatchReport>;

    /// Check that a collection exists and is accessible.
    async fn validate_exists(&self, collection_id: &str, cancel: &CancellationToken) -> Result<()> {
        self.collection_metadata(collection_id, cancel)
            .await
            .map(|_| ())
    }

    /// Add `items` in batches of at most `batch_size`.
    async fn apply_additions(
        &self,
        collection_id: &str,
        items: &[NewItem],
        batch_size: NonZeroUsize,
        cancel: &CancellationToken,
    ) -> ApplyOutcome {
        batch::apply_additions(self, collection_id, items, batch_size, cancel).await
    }

    /// Remove `values` in batches of at most `batch_size`.
    async fn apply_removals(
        &self,
        collection_id: &str,
        values: &[String],
        batch_size: NonZeroUsize,
        cancel: &CancellationToken,
    ) -> ApplyOutcome {
        batch::apply_removals(self, collection_id, values, batch_size, cancel).await
    }
}
