//! Diff computation for keyed maps

use crate::context::ManagedKeys;
use crate::types::ChangeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A difference for one key between the live and desired map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDiff<V> {
    /// Key inside the map
    pub key: String,
    /// Classification
    pub kind: ChangeKind,
    /// Live value, if any
    pub current: Option<V>,
    /// Desired value, if any
    pub desired: Option<V>,
}

impl<V> MapDiff<V> {
    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        self.kind == ChangeKind::Added
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        self.kind == ChangeKind::Removed
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        self.kind == ChangeKind::Changed
    }
}

/// Compute the differences between a live and a desired map
///
/// Keys matched by `managed` are skipped on both sides. Diffs are returned
/// as removals, then modifications, then additions, each in key order.
pub fn compute_map_diffs<V>(
    live: &BTreeMap<String, V>,
    desired: &BTreeMap<String, V>,
    managed: &dyn ManagedKeys,
) -> Vec<MapDiff<V>>
where
    V: PartialEq + Clone,
{
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    for (key, current) in live {
        if managed.is_managed(key) {
            continue;
        }
        match desired.get(key) {
            None => removed.push(MapDiff {
                key: key.clone(),
                kind: ChangeKind::Removed,
                current: Some(current.clone()),
                desired: None,
            }),
            Some(want) if want != current => changed.push(MapDiff {
                key: key.clone(),
                kind: ChangeKind::Changed,
                current: Some(current.clone()),
                desired: Some(want.clone()),
            }),
            Some(_) => {}
        }
    }

    let added = desired
        .iter()
        .filter(|(key, _)| !managed.is_managed(key) && !live.contains_key(*key))
        .map(|(key, want)| MapDiff {
            key: key.clone(),
            kind: ChangeKind::Added,
            current: None,
            desired: Some(want.clone()),
        });

    removed.into_iter().chain(changed).chain(added).collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of keys to add
    pub additions: usize,
    /// Number of keys to remove
    pub removals: usize,
    /// Number of keys to modify
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs<V>(diffs: &[MapDiff<V>]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.kind {
                ChangeKind::Added => summary.additions += 1,
                ChangeKind::Removed => summary.removals += 1,
                ChangeKind::Changed => summary.modifications += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
