//! Apply context and policy traits
//!
//! These traits let callers decide which keys are owned by someone else
//! and how changes are described, without the engine knowing the domain.

use crate::diff::MapDiff;
use crate::types::ChangeKind;
use std::collections::BTreeSet;
use std::fmt;

/// Policy for keys that must never be reported or mutated
///
/// Keys matched by a policy are frozen: the engine skips them on both
/// the live and the desired side.
pub trait ManagedKeys: Send + Sync {
    /// Check if a key is owned outside of reconciliation
    fn is_managed(&self, key: &str) -> bool;
}

/// Policy that manages nothing
pub struct NoManaged;

impl ManagedKeys for NoManaged {
    fn is_managed(&self, _key: &str) -> bool {
        false
    }
}

/// Keys starting with a fixed prefix are managed
#[derive(Debug, Clone)]
pub struct KeyPrefix(pub String);

impl KeyPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }
}

impl ManagedKeys for KeyPrefix {
    fn is_managed(&self, key: &str) -> bool {
        !self.0.is_empty() && key.starts_with(&self.0)
    }
}

/// An explicit set of managed names
#[derive(Debug, Clone, Default)]
pub struct ReservedNames(pub BTreeSet<String>);

impl ReservedNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl ManagedKeys for ReservedNames {
    fn is_managed(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

impl<F> ManagedKeys for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_managed(&self, key: &str) -> bool {
        self(key)
    }
}

/// Formats the message attached to each change record
pub trait Describe<V> {
    /// Describe a diff; `dry_run` selects "would" phrasing
    fn describe(&self, diff: &MapDiff<V>, dry_run: bool) -> String;
}

/// Generic describer: `<noun> "<key>"` with values rendered via `Debug`
pub struct Plain {
    pub noun: &'static str,
}

impl<V: fmt::Debug> Describe<V> for Plain {
    fn describe(&self, diff: &MapDiff<V>, dry_run: bool) -> String {
        let verb = match (diff.kind, dry_run) {
            (ChangeKind::Added, false) => "Added",
            (ChangeKind::Added, true) => "Would add",
            (ChangeKind::Changed, false) => "Changed",
            (ChangeKind::Changed, true) => "Would change",
            (ChangeKind::Removed, false) => "Removed",
            (ChangeKind::Removed, true) => "Would remove",
        };
        match (&diff.current, &diff.desired) {
            (Some(from), Some(to)) => {
                format!("{verb} {} \"{}\": {from:?} -> {to:?}", self.noun, diff.key)
            }
            (None, Some(to)) => format!("{verb} {} \"{}\" = {to:?}", self.noun, diff.key),
            (Some(from), None) => format!("{verb} {} \"{}\" ({from:?})", self.noun, diff.key),
            (None, None) => format!("{verb} {} \"{}\"", self.noun, diff.key),
        }
    }
}

/// Context passed to apply operations
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyContext {
    /// Whether this is a dry run (no mutation)
    pub dry_run: bool,
}

impl ApplyContext {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Context that mutates
    pub fn apply() -> Self {
        Self { dry_run: false }
    }

    /// Context that only reports
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix() {
        let policy = KeyPrefix::new("volatile.");
        assert!(policy.is_managed("volatile.eth0.hwaddr"));
        assert!(!policy.is_managed("limits.cpu"));
    }

    #[test]
    fn test_empty_prefix_manages_nothing() {
        let policy = KeyPrefix::new("");
        assert!(!policy.is_managed("anything"));
    }

    #[test]
    fn test_reserved_names() {
        let policy = ReservedNames::new(["root"]);
        assert!(policy.is_managed("root"));
        assert!(!policy.is_managed("rootfs"));
    }

    #[test]
    fn test_closure_policy() {
        let policy = |key: &str| key.ends_with(".lock");
        assert!(ManagedKeys::is_managed(&policy, "a.lock"));
        assert!(!ManagedKeys::is_managed(&policy, "a"));
    }

    #[test]
    fn test_plain_describe_phrasing() {
        let diff = MapDiff {
            key: "k".to_string(),
            kind: ChangeKind::Added,
            current: None,
            desired: Some(1),
        };
        let plain = Plain { noun: "entry" };
        assert_eq!(plain.describe(&diff, false), "Added entry \"k\" = 1");
        assert_eq!(plain.describe(&diff, true), "Would add entry \"k\" = 1");
    }
}
