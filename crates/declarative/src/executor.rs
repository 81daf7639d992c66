//! Apply engine for map diffs
//!
//! Turns diffs into change records and, outside of dry runs, writes them
//! into the live map. Persisting the map is left to the caller.

use crate::context::{ApplyContext, Describe, ManagedKeys};
use crate::diff::{MapDiff, compute_map_diffs};
use crate::types::{Change, ChangeKind};
use std::collections::BTreeMap;

/// Apply a list of diffs to a live map
///
/// In a dry run the map is left untouched and every record has
/// `applied == false`.
pub fn apply_diffs<V>(
    live: &mut BTreeMap<String, V>,
    diffs: Vec<MapDiff<V>>,
    ctx: &ApplyContext,
    describe: &dyn Describe<V>,
) -> Vec<Change> {
    let mut changes = Vec::with_capacity(diffs.len());

    for diff in diffs {
        let message = describe.describe(&diff, ctx.dry_run);

        if !ctx.dry_run {
            match diff.kind {
                ChangeKind::Removed => {
                    live.remove(&diff.key);
                }
                ChangeKind::Added | ChangeKind::Changed => {
                    if let Some(value) = diff.desired {
                        live.insert(diff.key.clone(), value);
                    }
                }
            }
        }

        changes.push(Change::new(diff.key, diff.kind, message, !ctx.dry_run));
    }

    changes
}

/// Diff `live` against `desired` and apply the result
pub fn reconcile_map<V>(
    live: &mut BTreeMap<String, V>,
    desired: &BTreeMap<String, V>,
    managed: &dyn ManagedKeys,
    ctx: &ApplyContext,
    describe: &dyn Describe<V>,
) -> Vec<Change>
where
    V: PartialEq + Clone,
{
    let diffs = compute_map_diffs(live, desired, managed);
    apply_diffs(live, diffs, ctx, describe)
}
