//! Shared sync types and constants.

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientError;

/// Default number of identifiers per mutation request.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(50).unwrap();

/// What to do with target items that no longer have a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Leave them in the target.
    #[default]
    Ignore,
    /// Remove them from the target.
    Delete,
    /// Leave them in place and report each one.
    Alert,
}

impl MissingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Delete => "delete",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised missing-policy value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid missing policy '{0}' (expected ignore, delete or alert)")]
pub struct ParseMissingPolicyError(pub String);

impl FromStr for MissingPolicy {
    type Err = ParseMissingPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "delete" => Ok(Self::Delete),
            "alert" => Ok(Self::Alert),
            _ => Err(ParseMissingPolicyError(s.to_string())),
        }
    }
}

/// A set of identifiers (tags, blueprint ids, blueprint names).
///
/// Membership is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet(BTreeSet<String>);

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(value)
    }

    /// Whether any of `values` is a member.
    pub fn contains_any<'a>(&self, values: impl IntoIterator<Item = &'a String>) -> bool {
        values.into_iter().any(|v| self.contains(v))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        self.0.insert(value.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Blueprint ids and names to match against a device's assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintFilter {
    pub ids: Vec<String>,
    pub names: Vec<String>,
}

impl BlueprintFilter {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty()
    }
}

/// Which source devices are eligible for the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Reject devices without an assigned owner.
    pub require_owner: bool,
    /// Admit iPhone and iPad devices.
    pub include_mobile: bool,
    /// When non-empty, admit only devices carrying one of these tags.
    pub include_tags: Vec<String>,
    /// Reject devices carrying any of these tags.
    pub exclude_tags: Vec<String>,
    pub blueprints_include: BlueprintFilter,
    pub blueprints_exclude: BlueprintFilter,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            require_owner: true,
            include_mobile: false,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            blueprints_include: BlueprintFilter::default(),
            blueprints_exclude: BlueprintFilter::default(),
        }
    }
}

/// Options for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// The read-write collection.
    pub target_collection: String,
    /// Read-only collections merged into the source set.
    pub auxiliary_collections: Vec<String>,
    pub policy: FilterPolicy,
    pub missing_policy: MissingPolicy,
    pub batch_size: NonZeroUsize,
}

impl SyncOptions {
    /// Options for `target` with default policy and batch size.
    pub fn new(target_collection: impl Into<String>) -> Self {
        Self {
            target_collection: target_collection.into(),
            auxiliary_collections: Vec::new(),
            policy: FilterPolicy::default(),
            missing_policy: MissingPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Check the collection ids before they reach an engine.
    ///
    /// The target must be named and must not double as an auxiliary
    /// collection; a target that sources itself never loses an item.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.target_collection.trim().is_empty() {
            return Err(SyncError::InvalidOptions(
                "target collection id is empty".to_string(),
            ));
        }
        if self
            .auxiliary_collections
            .iter()
            .any(|id| *id == self.target_collection)
        {
            return Err(SyncError::InvalidOptions(format!(
                "target collection {} is also listed as an auxiliary collection",
                self.target_collection
            )));
        }
        Ok(())
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Devices returned by the directory.
    pub source_total: usize,
    /// Devices admitted by the filter.
    pub eligible: usize,
    pub additions_proposed: usize,
    pub additions_applied: usize,
    pub removals_proposed: usize,
    pub removals_applied: usize,
    /// Target items reported under the alert policy.
    pub missing_alerted: usize,
    /// Failed items, failed batches, skipped collections.
    pub errors: usize,
}

/// A reconciliation pass that could not run to completion.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Listing devices failed; the pass made no changes.
    #[error("failed to list directory devices: {0}")]
    Directory(#[source] ClientError),

    /// Reading the target collection failed; the pass made no changes.
    #[error("failed to read target collection {collection}: {source}")]
    TargetCollection {
        collection: String,
        #[source]
        source: ClientError,
    },

    /// The engine was given options it cannot run with.
    #[error("invalid sync options: {0}")]
    InvalidOptions(String),

    /// Another pass is still running on this engine.
    #[error("a reconciliation pass is already in progress")]
    PassInProgress,

    /// The shutdown signal fired before the pass could start applying changes.
    #[error("reconciliation pass cancelled")]
    Cancelled,
}

impl SyncError {
    /// Map a directory failure, keeping cancellation distinct.
    pub(crate) fn directory(err: ClientError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Directory(err)
        }
    }

    /// Map a target collection failure, keeping cancellation distinct.
    pub(crate) fn target(collection: &str, err: ClientError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::TargetCollection {
                collection: collection.to_string(),
                source: err,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_policy_parse_is_case_insensitive() {
        assert_eq!("ignore".parse::<MissingPolicy>(), Ok(MissingPolicy::Ignore));
        assert_eq!("DELETE".parse::<MissingPolicy>(), Ok(MissingPolicy::Delete));
        assert_eq!(" Alert ".parse::<MissingPolicy>(), Ok(MissingPolicy::Alert));
    }

    #[test]
    fn test_missing_policy_parse_rejects_unknown() {
        let err = "purge".parse::<MissingPolicy>().unwrap_err();
        assert!(err.to_string().contains("purge"));
        assert!("".parse::<MissingPolicy>().is_err());
    }

    #[test]
    fn test_missing_policy_default_and_display() {
        assert_eq!(MissingPolicy::default(), MissingPolicy::Ignore);
        assert_eq!(MissingPolicy::Delete.to_string(), "delete");
    }

    #[test]
    fn test_identifier_set() {
        let set: IdentifierSet = ["corp", "eng"].into_iter().collect();
        assert!(set.contains("corp"));
        assert!(!set.contains("Corp"));
        assert!(set.contains_any(&["x".to_string(), "eng".to_string()]));
        assert!(!set.contains_any(&Vec::<String>::new()));
        assert_eq!(set.len(), 2);
        assert!(IdentifierSet::new().is_empty());
    }

    #[test]
    fn test_sync_options_defaults() {
        let options = SyncOptions::new("list-1");
        assert_eq!(options.target_collection, "list-1");
        assert!(options.auxiliary_collections.is_empty());
        assert_eq!(options.batch_size.get(), 50);
        assert_eq!(options.missing_policy, MissingPolicy::Ignore);
        assert!(options.policy.require_owner);
        assert!(!options.policy.include_mobile);
    }

    #[test]
    fn test_sync_options_validate() {
        let mut options = SyncOptions::new("list-1");
        options.auxiliary_collections = vec!["list-2".to_string()];
        assert!(options.validate().is_ok());

        options.auxiliary_collections.push("list-1".to_string());
        let err = options.validate().unwrap_err();
        assert!(matches!(err, SyncError::InvalidOptions(_)));
        assert!(err.to_string().contains("list-1"));

        assert!(matches!(
            SyncOptions::new("  ").validate(),
            Err(SyncError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_sync_error_keeps_cancellation_distinct() {
        assert!(matches!(
            SyncError::directory(ClientError::Cancelled),
            SyncError::Cancelled
        ));
        assert!(matches!(
            SyncError::directory(ClientError::AuthRequired),
            SyncError::Directory(_)
        ));
        let err = SyncError::target("list-1", ClientError::not_found("list-1"));
        assert!(err.to_string().contains("list-1"));
    }
}
