//! Set reconciliation between the eligible source set and the target collection.
//!
//! Everything here is pure: snapshots go in, a plan and diagnostics come out.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::client::{CollectionKind, NewItem, SourceDevice, TargetItem};
use crate::sync::types::MissingPolicy;

/// Current state of an auxiliary collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliarySnapshot {
    pub id: String,
    pub kind: CollectionKind,
    /// Used as the comment for additions sourced from this collection.
    pub description: String,
    pub items: Vec<TargetItem>,
}

/// Current state of the target collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSnapshot {
    pub kind: CollectionKind,
    pub items: Vec<TargetItem>,
}

/// Mutations that bring the target in line with the merged source set.
///
/// Additions never contain a value already in the target and removals only
/// contain values from the target, so the two never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub additions: Vec<NewItem>,
    pub removals: BTreeSet<String>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Non-fatal findings recorded while reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileDiagnostic {
    /// An auxiliary collection's kind differs from the target's; it was skipped.
    KindMismatch {
        collection: String,
        expected: CollectionKind,
        found: CollectionKind,
    },
    /// A proposed addition was already present in the target and was dropped.
    AlreadyInTarget { identifier: String },
    /// A later duplicate of a proposed addition was dropped.
    DuplicateAddition { identifier: String },
    /// A target value has no source; reported under the alert policy.
    MissingFromSource { identifier: String },
}

impl ReconcileDiagnostic {
    /// Whether this diagnostic counts towards the pass's error total.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::KindMismatch { .. })
    }
}

impl fmt::Display for ReconcileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KindMismatch {
                collection,
                expected,
                found,
            } => write!(
                f,
                "collection {collection} has kind {found}, expected {expected}; skipped"
            ),
            Self::AlreadyInTarget { identifier } => {
                write!(f, "{identifier} is already in the target; addition dropped")
            }
            Self::DuplicateAddition { identifier } => {
                write!(f, "duplicate addition for {identifier} dropped")
            }
            Self::MissingFromSource { identifier } => {
                write!(f, "{identifier} is in the target but has no source")
            }
        }
    }
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub plan: ReconciliationPlan,
    pub diagnostics: Vec<ReconcileDiagnostic>,
}

impl Reconciliation {
    /// Number of diagnostics that count as errors.
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Number of target values reported under the alert policy.
    pub fn missing_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, ReconcileDiagnostic::MissingFromSource { .. }))
            .count()
    }
}

/// Compute the plan for one pass.
///
/// Auxiliary collections are merged in lexicographic order of their id, after
/// the eligible devices, so the first comment seen for an identifier is
/// stable across runs.
pub fn reconcile(
    eligible: &[&SourceDevice],
    auxiliary: &[AuxiliarySnapshot],
    target: &TargetSnapshot,
    missing_policy: MissingPolicy,
) -> Reconciliation {
    let mut diagnostics = Vec::new();

    let mut ordered: Vec<&AuxiliarySnapshot> = auxiliary.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut merged_aux = Vec::with_capacity(ordered.len());
    for collection in ordered {
        if collection.kind != target.kind {
            diagnostics.push(ReconcileDiagnostic::KindMismatch {
                collection: collection.id.clone(),
                expected: target.kind.clone(),
                found: collection.kind.clone(),
            });
            continue;
        }
        merged_aux.push(collection);
    }

    let source: HashSet<&str> = eligible
        .iter()
        .map(|d| d.identifier.as_str())
        .chain(
            merged_aux
                .iter()
                .flat_map(|c| c.items.iter().map(|i| i.value.as_str())),
        )
        .filter(|v| !v.is_empty())
        .collect();

    let target_values: HashSet<&str> = target.items.iter().map(|i| i.value.as_str()).collect();

    let mut proposed: Vec<NewItem> = eligible
        .iter()
        .filter(|d| !target_values.contains(d.identifier.as_str()))
        .map(|d| NewItem::new(&d.identifier, &d.display_name))
        .collect();
    for collection in &merged_aux {
        proposed.extend(
            collection
                .items
                .iter()
                .filter(|i| !i.value.is_empty() && !target_values.contains(i.value.as_str()))
                .map(|i| NewItem::new(&i.value, &collection.description)),
        );
    }

    let additions = dedup_additions(proposed, &target_values, &mut diagnostics);

    let missing: BTreeSet<String> = match missing_policy {
        MissingPolicy::Ignore => BTreeSet::new(),
        MissingPolicy::Delete | MissingPolicy::Alert => target_values
            .iter()
            .filter(|v| !source.contains(*v))
            .map(|v| (*v).to_string())
            .collect(),
    };

    let removals = match missing_policy {
        MissingPolicy::Delete => missing,
        MissingPolicy::Alert => {
            diagnostics.extend(
                missing
                    .into_iter()
                    .map(|identifier| ReconcileDiagnostic::MissingFromSource { identifier }),
            );
            BTreeSet::new()
        }
        MissingPolicy::Ignore => BTreeSet::new(),
    };

    Reconciliation {
        plan: ReconciliationPlan {
            additions,
            removals,
        },
        diagnostics,
    }
}

/// Drop additions already in the target and later duplicates of an identifier.
///
/// The first occurrence of each identifier keeps its comment.
pub fn dedup_additions(
    proposed: Vec<NewItem>,
    target_values: &HashSet<&str>,
    diagnostics: &mut Vec<ReconcileDiagnostic>,
) -> Vec<NewItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(proposed.len());
    let mut additions = Vec::with_capacity(proposed.len());

    for item in proposed {
        if target_values.contains(item.value.as_str()) {
            diagnostics.push(ReconcileDiagnostic::AlreadyInTarget {
                identifier: item.value,
            });
            continue;
        }
        if !seen.insert(item.value.clone()) {
            diagnostics.push(ReconcileDiagnostic::DuplicateAddition {
                identifier: item.value,
            });
            continue;
        }
        additions.push(item);
    }

    additions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Assignment, PlatformClass};

    fn device(serial: &str, name: &str) -> SourceDevice {
        SourceDevice {
            identifier: serial.to_string(),
            display_name: name.to_string(),
            owner_email: "owner@example.com".to_string(),
            platform: PlatformClass::Desktop,
            tags: Vec::new(),
            assignment: Assignment::default(),
        }
    }

    fn serial() -> CollectionKind {
        CollectionKind::from(CollectionKind::SERIAL)
    }

    fn target(values: &[&str]) -> TargetSnapshot {
        TargetSnapshot {
            kind: serial(),
            items: values.iter().map(|v| TargetItem::new(*v)).collect(),
        }
    }

    fn aux(id: &str, description: &str, values: &[&str]) -> AuxiliarySnapshot {
        AuxiliarySnapshot {
            id: id.to_string(),
            kind: serial(),
            description: description.to_string(),
            items: values.iter().map(|v| TargetItem::new(*v)).collect(),
        }
    }

    fn values(items: &[NewItem]) -> Vec<&str> {
        items.iter().map(|i| i.value.as_str()).collect()
    }

    #[test]
    fn adds_eligible_devices_missing_from_target() {
        let a = device("A", "Alice's Mac");
        let b = device("B", "Bob's Mac");
        let result = reconcile(&[&a, &b], &[], &target(&["A"]), MissingPolicy::Ignore);

        assert_eq!(result.plan.additions, vec![NewItem::new("B", "Bob's Mac")]);
        assert!(result.plan.removals.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn delete_policy_removes_values_without_source() {
        let a = device("A", "a");
        let result = reconcile(&[&a], &[], &target(&["A", "Z"]), MissingPolicy::Delete);

        assert!(result.plan.additions.is_empty());
        assert_eq!(
            result.plan.removals,
            BTreeSet::from(["Z".to_string()])
        );
    }

    #[test]
    fn ignore_policy_never_removes() {
        let a = device("A", "a");
        let result = reconcile(&[&a], &[], &target(&["A", "Z"]), MissingPolicy::Ignore);
        assert!(result.plan.is_empty());
        assert_eq!(result.missing_count(), 0);
    }

    #[test]
    fn alert_policy_reports_instead_of_removing() {
        let result = reconcile(&[], &[], &target(&["Y", "Z"]), MissingPolicy::Alert);

        assert!(result.plan.removals.is_empty());
        assert_eq!(result.missing_count(), 2);
        assert_eq!(
            result.diagnostics[0],
            ReconcileDiagnostic::MissingFromSource {
                identifier: "Y".to_string()
            }
        );
        assert_eq!(result.error_count(), 0);
    }

    #[test]
    fn auxiliary_items_protect_target_values_from_removal() {
        let collection = aux("aux-1", "Loaners", &["Z"]);
        let result = reconcile(&[], &[collection], &target(&["Z"]), MissingPolicy::Delete);
        assert!(result.plan.is_empty());
    }

    #[test]
    fn auxiliary_items_use_collection_description_as_comment() {
        let collection = aux("aux-1", "Loaners", &["L1"]);
        let result = reconcile(&[], &[collection], &target(&[]), MissingPolicy::Ignore);
        assert_eq!(result.plan.additions, vec![NewItem::new("L1", "Loaners")]);
    }

    #[test]
    fn empty_description_gives_empty_comment() {
        let collection = aux("aux-1", "", &["L1"]);
        let result = reconcile(&[], &[collection], &target(&[]), MissingPolicy::Ignore);
        assert_eq!(result.plan.additions, vec![NewItem::new("L1", "")]);
    }

    #[test]
    fn source_devices_win_over_auxiliary_items() {
        let a = device("A", "Device name");
        let collection = aux("aux-1", "Aux comment", &["A"]);
        let result = reconcile(&[&a], &[collection], &target(&[]), MissingPolicy::Ignore);

        assert_eq!(result.plan.additions, vec![NewItem::new("A", "Device name")]);
        assert_eq!(
            result.diagnostics,
            vec![ReconcileDiagnostic::DuplicateAddition {
                identifier: "A".to_string()
            }]
        );
    }

    #[test]
    fn auxiliary_tie_break_follows_collection_id_order() {
        // Supplied out of order; "aux-a" sorts first and wins.
        let later = aux("aux-b", "from b", &["X"]);
        let earlier = aux("aux-a", "from a", &["X"]);
        let result = reconcile(&[], &[later, earlier], &target(&[]), MissingPolicy::Ignore);

        assert_eq!(result.plan.additions, vec![NewItem::new("X", "from a")]);
    }

    #[test]
    fn kind_mismatch_skips_collection_and_counts_as_error() {
        let mut domains = aux("aux-1", "Domains", &["example.com"]);
        domains.kind = CollectionKind::new("DOMAIN");
        let result = reconcile(&[], &[domains], &target(&["S1"]), MissingPolicy::Delete);

        assert!(result.plan.additions.is_empty());
        // The skipped collection does not protect target values.
        assert_eq!(result.plan.removals, BTreeSet::from(["S1".to_string()]));
        assert_eq!(result.error_count(), 1);
        assert!(matches!(
            &result.diagnostics[0],
            ReconcileDiagnostic::KindMismatch { collection, .. } if collection == "aux-1"
        ));
    }

    #[test]
    fn additions_and_removals_are_disjoint() {
        let a = device("A", "a");
        let b = device("B", "b");
        let collection = aux("aux-1", "x", &["C", "D"]);
        let result = reconcile(
            &[&a, &b],
            &[collection],
            &target(&["B", "D", "E", "F"]),
            MissingPolicy::Delete,
        );

        for item in &result.plan.additions {
            assert!(!result.plan.removals.contains(&item.value));
        }
        assert_eq!(values(&result.plan.additions), ["A", "C"]);
        assert_eq!(
            result.plan.removals,
            BTreeSet::from(["E".to_string(), "F".to_string()])
        );
    }

    #[test]
    fn reconcile_is_idempotent_once_plan_is_applied() {
        let a = device("A", "a");
        let b = device("B", "b");
        let collection = aux("aux-1", "x", &["C"]);
        let mut snapshot = target(&["B", "Z"]);

        let first = reconcile(
            &[&a, &b],
            std::slice::from_ref(&collection),
            &snapshot,
            MissingPolicy::Delete,
        );
        assert!(!first.plan.is_empty());

        snapshot
            .items
            .retain(|i| !first.plan.removals.contains(&i.value));
        snapshot
            .items
            .extend(first.plan.additions.iter().map(|i| TargetItem::new(&i.value)));

        let second = reconcile(&[&a, &b], &[collection], &snapshot, MissingPolicy::Delete);
        assert!(second.plan.is_empty());
    }

    #[test]
    fn dedup_keeps_first_comment_and_drops_stale_target_values() {
        let proposed = vec![
            NewItem::new("A", "first"),
            NewItem::new("B", "b"),
            NewItem::new("A", "second"),
            NewItem::new("T", "already there"),
        ];
        let target_values: HashSet<&str> = HashSet::from(["T"]);
        let mut diagnostics = Vec::new();

        let additions = dedup_additions(proposed, &target_values, &mut diagnostics);

        assert_eq!(
            additions,
            vec![NewItem::new("A", "first"), NewItem::new("B", "b")]
        );
        assert_eq!(
            diagnostics,
            vec![
                ReconcileDiagnostic::DuplicateAddition {
                    identifier: "A".to_string()
                },
                ReconcileDiagnostic::AlreadyInTarget {
                    identifier: "T".to_string()
                },
            ]
        );
    }

    #[test]
    fn diagnostic_display() {
        let diag = ReconcileDiagnostic::KindMismatch {
            collection: "aux-1".to_string(),
            expected: serial(),
            found: CollectionKind::new("IP"),
        };
        let text = diag.to_string();
        assert!(text.contains("aux-1"));
        assert!(text.contains("IP"));
        assert!(text.contains("SERIAL"));
    }
}
