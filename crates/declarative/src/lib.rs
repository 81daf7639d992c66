//! # Declarative
//!
//! Declarative reconciliation of keyed maps.
//!
//! This crate compares a live map against a desired map, classifies every
//! differing key, and optionally writes the desired values into the live
//! map. It knows nothing about where the maps come from or how they are
//! persisted.
//!
//! ## Core Concepts
//!
//! - **MapDiff**: One differing key, classified as added, changed, or removed
//! - **ManagedKeys**: Policy for keys owned by someone else (never touched)
//! - **Describe**: Formats the message attached to each change
//! - **ChangeReport**: Change records grouped by map name
//!
//! ## Example
//!
//! ```
//! use declarative::{ApplyContext, ChangeReport, KeyPrefix, Plain, reconcile_map};
//! use std::collections::BTreeMap;
//!
//! let mut live = BTreeMap::from([
//!     ("limits.cpu".to_string(), "1".to_string()),
//!     ("volatile.base_image".to_string(), "abc".to_string()),
//! ]);
//! let desired = BTreeMap::from([("limits.cpu".to_string(), "2".to_string())]);
//!
//! let changes = reconcile_map(
//!     &mut live,
//!     &desired,
//!     &KeyPrefix::new("volatile."),
//!     &ApplyContext::apply(),
//!     &Plain { noun: "config key" },
//! );
//!
//! let mut report = ChangeReport::new();
//! report.insert("config", changes);
//! assert_eq!(report.summary().changed, 1);
//! assert_eq!(live["limits.cpu"], "2");
//! assert!(live.contains_key("volatile.base_image"));
//! ```

pub mod context;
pub mod diff;
pub mod executor;
pub mod report;
pub mod types;

// Re-export main types at crate root
pub use context::{ApplyContext, Describe, KeyPrefix, ManagedKeys, NoManaged, Plain, ReservedNames};
pub use diff::{DiffSummary, MapDiff, compute_map_diffs};
pub use executor::{apply_diffs, reconcile_map};
pub use report::ChangeReport;
pub use types::{Change, ChangeKind, ChangeSummary};
