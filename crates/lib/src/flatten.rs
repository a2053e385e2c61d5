//! Flattening of configuration trees into path/value updates.
//!
//! A remote element is configured through individual paths, while the
//! desired state is a nested [`ConfigTree`]. The [`Flattener`] walks a tree
//! and emits one [`PathValue`] per terminal value, using a
//! [`ReferencePaths`] table to learn which lists hold keyed entries and what
//! their key fields are.
//!
//! ```
//! use netconverge::flatten::{Flattener, ReferencePaths};
//! use netconverge::tree::{ConfigTree, Path};
//! use std::str::FromStr;
//!
//! let refs = ReferencePaths::parse(["port[port-id]"])?;
//! let tree = ConfigTree::from(serde_json::json!({
//!     "port": [{"port-id": "1/1/1", "admin-state": "enable"}]
//! }));
//! let updates = Flattener::new(&refs).flatten(&tree, &Path::new())?;
//! let paths: Vec<String> = updates.iter().map(|u| u.path.to_canonical()).collect();
//! assert_eq!(paths, ["port[port-id=1/1/1].admin-state", "port[port-id=1/1/1].port-id"]);
//! # Ok::<(), netconverge::Error>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::tree::{ConfigTree, Path, PathElem, PathError, PathValue, is_wildcard};

/// Errors raised while decoding a tree against a reference table.
///
/// All variants mean the tree does not have the shape the table declares.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlattenError {
    /// A declared list contains something other than a map entry.
    #[error("List entry at '{path}' is a {found}, expected a map")]
    NotAnEntry { path: String, found: &'static str },

    /// A list entry lacks one of its declared key fields.
    #[error("List entry at '{path}' is missing key field '{key}'")]
    MissingKey { path: String, key: String },

    /// A key field holds a value that cannot be used as a key. Keys are
    /// non-empty scalars other than `*`.
    #[error("Key field '{key}' at '{path}' cannot be used as a key: {found}")]
    InvalidKey {
        path: String,
        key: String,
        found: &'static str,
    },

    /// A list of maps appears where no keyed list is declared.
    #[error("List of entries at '{path}' has no declared key fields")]
    UndeclaredList { path: String },

    /// Two entries of the same list carry identical keys.
    #[error("Duplicate list entry '{path}'")]
    DuplicateEntry { path: String },
}

impl FlattenError {
    /// Returns the path the error was raised at.
    pub fn path(&self) -> &str {
        match self {
            FlattenError::NotAnEntry { path, .. }
            | FlattenError::MissingKey { path, .. }
            | FlattenError::InvalidKey { path, .. }
            | FlattenError::UndeclaredList { path }
            | FlattenError::DuplicateEntry { path } => path,
        }
    }

    /// Check if this error is caused by a missing or unusable key.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            FlattenError::MissingKey { .. } | FlattenError::InvalidKey { .. }
        )
    }
}

impl From<FlattenError> for crate::Error {
    fn from(err: FlattenError) -> Self {
        crate::Error::Flatten(err)
    }
}

/// The table of list positions that hold keyed entries.
///
/// Each declared path is absolute and written in structural form; its last
/// element names the key fields of the list, e.g. `interface[name]` or
/// `interface[name].subinterface[index]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ReferencePaths {
    // structural path of the list position -> key field names
    lists: BTreeMap<Path, Vec<String>>,
}

impl ReferencePaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from canonical path strings.
    pub fn parse<I, S>(paths: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut refs = Self::new();
        for path in paths {
            refs.insert(&Path::from_str(path.as_ref())?);
        }
        Ok(refs)
    }

    /// Declares the list addressed by the last element of `path`.
    ///
    /// Paths whose last element carries no keys declare nothing.
    pub fn insert(&mut self, path: &Path) {
        let Some(last) = path.last() else {
            return;
        };
        if !last.is_keyed() {
            return;
        }
        let keys = last.key_names().map(str::to_string).collect();
        self.lists.insert(list_position(path), keys);
    }

    /// Returns the key field names of the list at `position`.
    ///
    /// Key values in `position` are ignored, and so are keys on its last
    /// element.
    pub fn keys_for(&self, position: &Path) -> Option<&[String]> {
        self.lists.get(&list_position(position)).map(Vec::as_slice)
    }

    /// Returns `true` if `position` is a declared list.
    pub fn is_declared(&self, position: &Path) -> bool {
        self.keys_for(position).is_some()
    }

    /// Iterates over the declared paths in their structural form.
    pub fn iter(&self) -> impl Iterator<Item = Path> + '_ {
        self.lists.iter().map(|(position, keys)| declared_path(position, keys))
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

impl TryFrom<Vec<String>> for ReferencePaths {
    type Error = PathError;

    fn try_from(paths: Vec<String>) -> Result<Self, Self::Error> {
        ReferencePaths::parse(paths)
    }
}

impl From<ReferencePaths> for Vec<String> {
    fn from(refs: ReferencePaths) -> Self {
        refs.iter().map(|p| p.to_canonical()).collect()
    }
}

/// Structural path of a list position with the keys of the last element
/// dropped, the form used to index the table.
fn list_position(path: &Path) -> Path {
    let mut position = path.structural();
    if let Some(last) = position.last_mut() {
        *last = PathElem::new(last.name());
    }
    position
}

fn declared_path(position: &Path, keys: &[String]) -> Path {
    let mut path = position.clone();
    if let Some(last) = path.last_mut() {
        for key in keys {
            last.set_key(key.as_str(), "");
        }
    }
    path
}

/// Walks trees and emits their terminal values as [`PathValue`]s.
#[derive(Debug, Clone, Copy)]
pub struct Flattener<'a> {
    refs: &'a ReferencePaths,
}

impl<'a> Flattener<'a> {
    pub fn new(refs: &'a ReferencePaths) -> Self {
        Self { refs }
    }

    /// Flattens `tree`, which lives at `root`, into root-relative updates.
    ///
    /// Maps descend field by field. A declared list descends into each
    /// entry under a keyed element, and key fields are emitted as leaves of
    /// their entry. An undeclared list of scalars is one terminal value.
    /// Nulls, empty maps and empty lists emit nothing.
    pub fn flatten(&self, tree: &ConfigTree, root: &Path) -> Result<Vec<PathValue>, FlattenError> {
        let mut out = Vec::new();
        self.walk(tree, root, &Path::new(), &mut out)?;
        trace!(root = %root, count = out.len(), "Flattened tree");
        Ok(out)
    }

    fn walk(
        &self,
        node: &ConfigTree,
        root: &Path,
        rel: &Path,
        out: &mut Vec<PathValue>,
    ) -> Result<(), FlattenError> {
        match node {
            ConfigTree::Null => Ok(()),
            ConfigTree::Map(fields) => {
                for (field, child) in fields {
                    self.walk(child, root, &rel.child(field.as_str()), out)?;
                }
                Ok(())
            }
            ConfigTree::List(items) if items.is_empty() => Ok(()),
            ConfigTree::List(items) => {
                let absolute = root.clone().join(rel);
                match self.refs.keys_for(&absolute) {
                    Some(key_names) => self.walk_entries(items, key_names, root, rel, out),
                    None if items.iter().all(ConfigTree::is_scalar) => {
                        out.push(PathValue::new(rel.clone(), node.clone()));
                        Ok(())
                    }
                    None => Err(FlattenError::UndeclaredList {
                        path: absolute.to_canonical(),
                    }),
                }
            }
            scalar => {
                out.push(PathValue::new(rel.clone(), scalar.clone()));
                Ok(())
            }
        }
    }

    fn walk_entries(
        &self,
        items: &[ConfigTree],
        key_names: &[String],
        root: &Path,
        rel: &Path,
        out: &mut Vec<PathValue>,
    ) -> Result<(), FlattenError> {
        let mut seen = BTreeSet::new();
        for item in items {
            let entry = entry_path(rel, item, key_names).map_err(|err| err.at(root, rel))?;
            if !seen.insert(entry.clone()) {
                return Err(FlattenError::DuplicateEntry {
                    path: root.clone().join(&entry).to_canonical(),
                });
            }
            self.walk(item, root, &entry, out)?;
        }
        Ok(())
    }
}

/// Flattens `tree` at `root` with the given reference table.
pub fn flatten(
    tree: &ConfigTree,
    root: &Path,
    refs: &ReferencePaths,
) -> Result<Vec<PathValue>, FlattenError> {
    Flattener::new(refs).flatten(tree, root)
}

/// Failure to build an entry path, before the location is known.
enum EntryError {
    NotAnEntry(&'static str),
    MissingKey(String),
    InvalidKey(String, &'static str),
}

impl EntryError {
    fn at(self, root: &Path, rel: &Path) -> FlattenError {
        let path = root.clone().join(rel).to_canonical();
        match self {
            EntryError::NotAnEntry(found) => FlattenError::NotAnEntry { path, found },
            EntryError::MissingKey(key) => FlattenError::MissingKey { path, key },
            EntryError::InvalidKey(key, found) => FlattenError::InvalidKey { path, key, found },
        }
    }
}

/// Returns `rel` with its last element keyed by the entry's key values.
fn entry_path(rel: &Path, item: &ConfigTree, key_names: &[String]) -> Result<Path, EntryError> {
    let Some(fields) = item.as_map() else {
        return Err(EntryError::NotAnEntry(item.type_name()));
    };
    let mut keys = BTreeMap::new();
    for key in key_names {
        let value = fields
            .get(key)
            .ok_or_else(|| EntryError::MissingKey(key.clone()))?;
        let value = value
            .key_string()
            .ok_or_else(|| EntryError::InvalidKey(key.clone(), value.type_name()))?;
        if is_wildcard(&value) {
            return Err(EntryError::InvalidKey(key.clone(), "wildcard"));
        }
        keys.insert(key.clone(), value);
    }
    let mut path = rel.clone();
    match path.last_mut() {
        Some(last) => *last = PathElem::new(last.name()).with_keys(keys),
        None => return Err(EntryError::NotAnEntry("root list")),
    }
    Ok(path)
}

/// Removes marker fields from every map in the tree.
///
/// Markers exist only for local dependency resolution and must never be
/// sent to a remote element.
pub fn strip_markers(tree: &ConfigTree, markers: &[String]) -> ConfigTree {
    if markers.is_empty() {
        return tree.clone();
    }
    match tree {
        ConfigTree::Map(fields) => ConfigTree::Map(
            fields
                .iter()
                .filter(|(field, _)| !markers.iter().any(|m| m == *field))
                .map(|(field, child)| (field.clone(), strip_markers(child, markers)))
                .collect(),
        ),
        ConfigTree::List(items) => {
            ConfigTree::List(items.iter().map(|item| strip_markers(item, markers)).collect())
        }
        scalar => scalar.clone(),
    }
}

/// Wraps bare entries found at declared list positions into one-element lists.
///
/// Remote elements may return a list holding a single entry as the entry
/// itself. Normalizing the observed tree first lets both sides of a
/// comparison flatten to the same paths.
pub fn normalize_entry_lists(tree: &ConfigTree, root: &Path, refs: &ReferencePaths) -> ConfigTree {
    normalize(tree, &root.structural(), refs)
}

fn normalize(node: &ConfigTree, at: &Path, refs: &ReferencePaths) -> ConfigTree {
    match node {
        ConfigTree::Map(fields) => ConfigTree::Map(
            fields
                .iter()
                .map(|(field, child)| {
                    let position = at.child(field.as_str());
                    let child = match refs.keys_for(&position) {
                        Some(keys) => {
                            let entry_at = declared_path(&position, keys);
                            let entries = match child {
                                ConfigTree::Map(_) => vec![child.clone()],
                                ConfigTree::List(items) => items.clone(),
                                other => return (field.clone(), other.clone()),
                            };
                            ConfigTree::List(
                                entries
                                    .iter()
                                    .map(|entry| normalize(entry, &entry_at, refs))
                                    .collect(),
                            )
                        }
                        None => normalize(child, &position, refs),
                    };
                    (field.clone(), child)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Rebuilds a tree from flattened updates.
///
/// Keyed elements become list entries, in order of first appearance. For
/// trees without nulls or empty containers this inverts [`Flattener::flatten`].
pub fn unflatten(updates: &[PathValue]) -> ConfigTree {
    let mut tree = ConfigTree::empty_map();
    for update in updates {
        insert_at(&mut tree, update.path.elems(), &update.value);
    }
    tree
}

fn insert_at(node: &mut ConfigTree, elems: &[PathElem], value: &ConfigTree) {
    let Some((elem, rest)) = elems.split_first() else {
        *node = value.clone();
        return;
    };
    if !node.is_map() {
        *node = ConfigTree::empty_map();
    }
    let ConfigTree::Map(fields) = node else {
        return;
    };
    let child = fields
        .entry(elem.name().to_string())
        .or_insert(ConfigTree::Null);

    if !elem.is_keyed() {
        insert_at(child, rest, value);
        return;
    }

    if !child.is_list() {
        *child = ConfigTree::List(Vec::new());
    }
    let ConfigTree::List(entries) = child else {
        return;
    };
    let position = entries.iter().position(|entry| entry_matches(entry, elem));
    let entry = match position {
        Some(i) => &mut entries[i],
        None => {
            let fields = elem
                .keys()
                .iter()
                .map(|(k, v)| (k.clone(), ConfigTree::from(v.as_str())))
                .collect();
            entries.push(ConfigTree::Map(fields));
            let last = entries.len() - 1;
            &mut entries[last]
        }
    };
    insert_at(entry, rest, value);
}

fn entry_matches(entry: &ConfigTree, elem: &PathElem) -> bool {
    elem.keys().iter().all(|(key, expected)| {
        entry
            .get(key)
            .and_then(ConfigTree::key_string)
            .is_some_and(|actual| actual == *expected)
    })
}
