//! Core types for declarative map reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single entry change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Entry exists only in the desired map
    Added,
    /// Entry exists in both maps with different values
    Changed,
    /// Entry exists only in the live map
    Removed,
}

impl ChangeKind {
    /// Lowercase name used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change record produced by reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Key of the entry inside its map
    pub field: String,
    /// What kind of change this is
    pub kind: ChangeKind,
    /// Human-readable description
    pub message: String,
    /// Whether the change was written to the live map
    pub applied: bool,
}

impl Change {
    /// Create a change record
    pub fn new(
        field: impl Into<String>,
        kind: ChangeKind,
        message: impl Into<String>,
        applied: bool,
    ) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
            applied,
        }
    }
}

/// Counts of changes by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    /// Records that were only reported (dry run)
    pub pending: usize,
}

impl ChangeSummary {
    /// Total number of changes
    pub fn total(&self) -> usize {
        self.added + self.changed + self.removed
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ChangeSummary) {
        self.added += other.added;
        self.changed += other.changed;
        self.removed += other.removed;
        self.pending += other.pending;
    }

    /// Add a change to the summary
    pub fn add_change(&mut self, change: &Change) {
        match change.kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Changed => self.changed += 1,
            ChangeKind::Removed => self.removed += 1,
        }
        if !change.applied {
            self.pending += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_display() {
        assert_eq!(ChangeKind::Added.to_string(), "added");
        assert_eq!(ChangeKind::Changed.to_string(), "changed");
        assert_eq!(ChangeKind::Removed.to_string(), "removed");
    }

    #[test]
    fn test_change_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ChangeKind::Removed).unwrap();
        assert_eq!(json, "\"removed\"");
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ChangeSummary::default();
        summary.add_change(&Change::new("a", ChangeKind::Added, "", true));
        summary.add_change(&Change::new("b", ChangeKind::Removed, "", false));

        assert_eq!(summary.total(), 2);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.pending, 1);
        assert!(summary.has_changes());
    }

    #[test]
    fn test_summary_merge() {
        let mut a = ChangeSummary {
            added: 1,
            ..Default::default()
        };
        let b = ChangeSummary {
            changed: 2,
            pending: 2,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.total(), 3);
        assert_eq!(a.pending, 2);
    }
}
