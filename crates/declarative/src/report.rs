//! Grouped change reports

use crate::types::{Change, ChangeSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Change records grouped by the map they belong to
///
/// Groups without records are never stored, so an empty report means
/// nothing differed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeReport {
    groups: BTreeMap<String, Vec<Change>>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records under a group; empty input is ignored
    pub fn insert(&mut self, group: impl Into<String>, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        self.groups.entry(group.into()).or_default().extend(changes);
    }

    /// Append a single record under a group
    pub fn push(&mut self, group: impl Into<String>, change: Change) {
        self.groups.entry(group.into()).or_default().push(change);
    }

    /// Records of a group, if it has any
    pub fn group(&self, group: &str) -> Option<&[Change]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Find the record for a field inside a group
    pub fn find(&self, group: &str, field: &str) -> Option<&Change> {
        self.group(group)?.iter().find(|c| c.field == field)
    }

    /// Names of all non-empty groups
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether any record was written to a live map
    pub fn any_applied(&self) -> bool {
        self.groups.values().flatten().any(|c| c.applied)
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: ChangeReport) {
        for (group, changes) in other.groups {
            self.insert(group, changes);
        }
    }

    /// Counts across all groups
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in self.groups.values().flatten() {
            summary.add_change(change);
        }
        summary
    }

    /// Flatten to `group -> field -> message`
    pub fn messages(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.groups
            .iter()
            .map(|(group, changes)| {
                let inner = changes
                    .iter()
                    .map(|c| (c.field.clone(), c.message.clone()))
                    .collect();
                (group.clone(), inner)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;

    #[test]
    fn test_empty_groups_are_omitted() {
        let mut report = ChangeReport::new();
        report.insert("config", Vec::new());
        assert!(report.is_empty());
        assert!(report.group("config").is_none());
    }

    #[test]
    fn test_find_and_messages() {
        let mut report = ChangeReport::new();
        report.insert(
            "config",
            vec![Change::new("a", ChangeKind::Removed, "Removed a", true)],
        );
        report.push("devices", Change::new("eth0", ChangeKind::Added, "Added eth0", false));

        assert_eq!(report.find("config", "a").unwrap().kind, ChangeKind::Removed);
        assert!(report.find("config", "b").is_none());
        assert!(report.any_applied());

        let messages = report.messages();
        assert_eq!(messages["devices"]["eth0"], "Added eth0");
        assert_eq!(report.group_names().collect::<Vec<_>>(), ["config", "devices"]);
    }

    #[test]
    fn test_merge_and_summary() {
        let mut a = ChangeReport::new();
        a.push("config", Change::new("x", ChangeKind::Added, "", true));
        let mut b = ChangeReport::new();
        b.push("config", Change::new("y", ChangeKind::Changed, "", true));
        b.push("profiles", Change::new("profiles", ChangeKind::Changed, "", true));

        a.merge(b);
        assert_eq!(a.group("config").unwrap().len(), 2);
        assert_eq!(a.summary().total(), 3);
    }

    #[test]
    fn test_serializes_as_group_map() {
        let mut report = ChangeReport::new();
        report.push("config", Change::new("x", ChangeKind::Added, "m", true));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["config"][0]["field"], "x");
        assert_eq!(json["config"][0]["kind"], "added");
    }
}
