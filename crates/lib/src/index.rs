//! Tracking of list-entry keys across reconcile cycles.
//!
//! When an operator renames the key of a list entry, the desired tree simply
//! holds a different entry. Diffing against the remote element would create
//! the new entry but cannot know that the old one belonged to this resource.
//! The [`IndexTracker`] remembers, per declared list position, the key that
//! was last seen there and emits a delete for the old entry when it changes.
//!
//! Only positions holding exactly one entry are tracked. When a list holds
//! several entries the delta calculator sees their churn directly.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::delta::reduce_prefix_maximal;
use crate::flatten::ReferencePaths;
use crate::tree::{ConfigTree, Path, PathElem, is_wildcard};

/// Root-relative structural path of a list position to the key value last
/// observed there.
///
/// Single-key entries store the key value as is. Multi-key entries store a
/// JSON array of the values in declared key order.
pub type ResourceIndexMap = BTreeMap<String, String>;

/// Result of comparing the current tree against the previous index map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexChange {
    /// `true` iff at least one delete path was emitted.
    pub changed: bool,
    /// Root-relative paths of entries left behind by a key change.
    pub delete_paths: Vec<Path>,
    /// The index map to persist for the next cycle.
    pub next: ResourceIndexMap,
}

type KeyMap = BTreeMap<String, String>;

/// One occurrence of a declared list in the current tree.
#[derive(Debug)]
struct Occurrence {
    parent: Path,
    name: String,
    key_names: Vec<String>,
    entries: Vec<KeyMap>,
}

/// Detects renamed list entries using a reference table.
#[derive(Debug, Clone, Copy)]
pub struct IndexTracker<'a> {
    refs: &'a ReferencePaths,
}

impl<'a> IndexTracker<'a> {
    pub fn new(refs: &'a ReferencePaths) -> Self {
        Self { refs }
    }

    /// Compares `current`, which lives at `root`, with `previous`.
    ///
    /// `current` must already have its markers stripped.
    pub fn track(&self, root: &Path, previous: &ResourceIndexMap, current: &ConfigTree) -> IndexChange {
        let mut occurrences: BTreeMap<String, Vec<Occurrence>> = BTreeMap::new();
        self.collect(current, root, &Path::new(), &mut occurrences);

        let mut next = ResourceIndexMap::new();
        // Positions whose single entry changed key, with the old key-map.
        let mut renamed: BTreeMap<&str, (&Occurrence, KeyMap)> = BTreeMap::new();
        for (position, found) in &occurrences {
            let [occurrence] = found.as_slice() else {
                continue;
            };
            let [keys] = occurrence.entries.as_slice() else {
                continue;
            };
            let value = encode_keys(&occurrence.key_names, keys);
            if let Some(old) = previous.get(position).filter(|old| **old != value) {
                match decode_keys(&occurrence.key_names, old) {
                    Some(old_keys) => {
                        debug!(%position, %old, new = %value, "List entry key changed");
                        renamed.insert(position.as_str(), (occurrence, old_keys));
                    }
                    None => warn!(%position, %old, "Cannot decode previous entry key"),
                }
            }
            next.insert(position.clone(), value);
        }

        let deletes = renamed
            .values()
            .map(|(occurrence, old_keys)| old_entry_path(occurrence, old_keys, &renamed));
        let delete_paths = reduce_prefix_maximal(deletes);

        for (position, value) in previous {
            if next.contains_key(position) {
                continue;
            }
            if self.still_declared(root, position) {
                next.insert(position.clone(), value.clone());
            } else {
                debug!(%position, "Dropping undeclared index entry");
            }
        }

        IndexChange {
            changed: !delete_paths.is_empty(),
            delete_paths,
            next,
        }
    }

    fn still_declared(&self, root: &Path, position: &str) -> bool {
        match Path::from_str(position) {
            Ok(path) => self.refs.is_declared(&root.clone().join(&path)),
            Err(_) => false,
        }
    }

    fn collect(
        &self,
        node: &ConfigTree,
        root: &Path,
        at: &Path,
        occurrences: &mut BTreeMap<String, Vec<Occurrence>>,
    ) {
        let Some(fields) = node.as_map() else {
            return;
        };
        for (field, child) in fields {
            let position = at.child(field.as_str());
            let Some(key_names) = self.refs.keys_for(&root.clone().join(&position)) else {
                self.collect(child, root, &position, occurrences);
                continue;
            };
            let entries: &[ConfigTree] = match child {
                ConfigTree::List(items) => items,
                ConfigTree::Map(_) => std::slice::from_ref(child),
                _ => continue,
            };

            let mut occurrence = Occurrence {
                parent: at.clone(),
                name: field.clone(),
                key_names: key_names.to_vec(),
                entries: Vec::new(),
            };
            for entry in entries {
                let Some(keys) = entry_keys(entry, key_names) else {
                    continue;
                };
                let entry_path = at.child(PathElem::new(field.as_str()).with_keys(keys.clone()));
                occurrence.entries.push(keys);
                self.collect(entry, root, &entry_path, occurrences);
            }

            let structural = at
                .child(PathElem::new(field.as_str()).with_keys(
                    key_names.iter().map(|k| (k.clone(), String::new())).collect(),
                ))
                .structural()
                .to_canonical();
            occurrences.entry(structural).or_default().push(occurrence);
        }
    }
}

/// Key values of an entry; `None` if one is missing or is not a concrete value.
fn entry_keys(entry: &ConfigTree, key_names: &[String]) -> Option<KeyMap> {
    key_names
        .iter()
        .map(|k| {
            entry
                .get(k)
                .and_then(ConfigTree::key_string)
                .filter(|v| !is_wildcard(v))
                .map(|v| (k.clone(), v))
        })
        .collect()
}

fn encode_keys(key_names: &[String], keys: &KeyMap) -> String {
    let values: Vec<String> = key_names
        .iter()
        .map(|k| keys.get(k).cloned().unwrap_or_default())
        .collect();
    match values.as_slice() {
        [single] => single.clone(),
        _ => serde_json::Value::from(values).to_string(),
    }
}

fn decode_keys(key_names: &[String], stored: &str) -> Option<KeyMap> {
    let values: Vec<String> = match key_names {
        [_] => vec![stored.to_string()],
        _ => serde_json::from_str(stored).ok()?,
    };
    if values.len() != key_names.len() || values.iter().any(|v| is_wildcard(v)) {
        return None;
    }
    Some(key_names.iter().cloned().zip(values).collect())
}

/// Path of the entry as it was before the rename. Ancestors renamed in the
/// same pass are addressed by their old keys as well.
fn old_entry_path(
    occurrence: &Occurrence,
    old_keys: &KeyMap,
    renamed: &BTreeMap<&str, (&Occurrence, KeyMap)>,
) -> Path {
    let mut path = Path::new();
    for elem in occurrence.parent.elems() {
        let mut elem = elem.clone();
        if elem.is_keyed() {
            let position = path.child(elem.clone()).structural().to_canonical();
            if let Some((_, keys)) = renamed.get(position.as_str()) {
                elem = PathElem::new(elem.name()).with_keys(keys.clone());
            }
        }
        path = path.push(elem);
    }
    path.child(PathElem::new(occurrence.name.as_str()).with_keys(old_keys.clone()))
}
