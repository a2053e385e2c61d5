//! Minimal deltas between flattened trees.
//!
//! [`diff`] compares a desired and an observed set of [`PathValue`]s and
//! returns the updates that bring the observed side to the desired one, plus
//! the paths that must be deleted. Deletes are always kept prefix-maximal:
//! if a path is deleted, none of its descendants is listed separately.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tree::{ConfigTree, Path, PathValue};

/// The changes needed to converge an observed tree on a desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Paths whose value must be written, in desired order.
    pub updates: Vec<PathValue>,
    /// Prefix-maximal paths to remove, in observed order.
    pub deletes: Vec<Path>,
}

impl Delta {
    /// Returns `true` if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Adds deletes from another source and reduces the result again.
    pub fn merge_deletes(&mut self, extra: impl IntoIterator<Item = Path>) {
        let merged = std::mem::take(&mut self.deletes).into_iter().chain(extra);
        self.deletes = reduce_prefix_maximal(merged);
    }
}

/// Computes the delta from `observed` to `desired`.
///
/// Both sides must already be normalized and flattened relative to the same
/// root.
pub fn diff(desired: &[PathValue], observed: &[PathValue]) -> Delta {
    let observed_values: BTreeMap<String, &ConfigTree> = observed
        .iter()
        .map(|pv| (pv.path.to_canonical(), &pv.value))
        .collect();
    let desired_paths: HashSet<String> = desired.iter().map(|pv| pv.path.to_canonical()).collect();

    let updates: Vec<PathValue> = desired
        .iter()
        .filter(|pv| observed_values.get(&pv.path.to_canonical()) != Some(&&pv.value))
        .cloned()
        .collect();

    let candidates = observed
        .iter()
        .filter(|pv| !desired_paths.contains(&pv.path.to_canonical()))
        .map(|pv| pv.path.clone());
    let deletes = reduce_prefix_maximal(candidates);

    for update in &updates {
        debug!(path = %update.path, value = %update.value, "Update");
    }
    for delete in &deletes {
        debug!(path = %delete, "Delete");
    }

    Delta { updates, deletes }
}

/// Reduces a set of paths to its prefix-maximal members.
///
/// Duplicates and every path with a strict ancestor in the set are dropped.
/// The order of first appearance is kept.
pub fn reduce_prefix_maximal(paths: impl IntoIterator<Item = Path>) -> Vec<Path> {
    let mut ordered = Vec::new();
    let mut seen = BTreeSet::new();
    for path in paths {
        if seen.insert(path.clone()) {
            ordered.push(path);
        }
    }
    ordered
        .into_iter()
        .filter(|path| {
            (1..path.len()).all(|n| !seen.contains(&Path::from_elems(path.elems()[..n].to_vec())))
        })
        .collect()
}
