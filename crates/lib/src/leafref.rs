//! Validation of leaf references.
//!
//! A leaf reference is a value in one part of a tree that names an entry in
//! another part, such as a sub-interface pointing at the port it rides on.
//! A [`ReferenceRule`] pairs the pattern locating such values with the
//! pattern of the list they must resolve into:
//!
//! ```text
//! local_path:  service.vpls[service-name].sap[sap-id].port
//! remote_path: port[port-id]
//! ```
//!
//! Every value found under `local_path` is substituted into the last key
//! placeholder (an empty value or `*`) of `remote_path`, and the resulting path must exist in the
//! local tree ([`ValidationMode::Local`]) or in an externally supplied tree
//! ([`ValidationMode::External`]). Earlier placeholders, and `*`, match any
//! entry.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::tree::{ConfigTree, Path, PathElem, is_wildcard};

/// Errors that prevent validation from running at all.
///
/// Unresolved references are not errors; they are reported in the
/// [`Validation`] result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LeafRefError {
    /// External validation was requested without an external tree.
    #[error("External leaf-ref validation requires an external tree")]
    MissingExternalTree,

    /// The remote pattern has no placeholder key to receive the value.
    #[error("Remote pattern '{remote_path}' has no key placeholder")]
    NoPlaceholder { remote_path: String },
}

impl LeafRefError {
    /// Check if this error is caused by a malformed rule.
    pub fn is_rule_error(&self) -> bool {
        matches!(self, LeafRefError::NoPlaceholder { .. })
    }
}

impl From<LeafRefError> for crate::Error {
    fn from(err: LeafRefError) -> Self {
        crate::Error::LeafRef(err)
    }
}

/// Where referenced entries are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// In the same tree the values are taken from.
    Local,
    /// In a tree supplied by the caller, usually the element's full config.
    External,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Local => write!(f, "local"),
            ValidationMode::External => write!(f, "external"),
        }
    }
}

/// A pair of patterns describing one kind of reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRule {
    /// Pattern locating the referring values.
    pub local_path: Path,
    /// Pattern of the entries the values must name.
    pub remote_path: Path,
}

impl ReferenceRule {
    pub fn new(local_path: Path, remote_path: Path) -> Self {
        Self {
            local_path,
            remote_path,
        }
    }

    /// Substitutes `value` into the last placeholder key of the remote
    /// pattern. A placeholder is an empty key value or `*`.
    pub fn remote_for(&self, value: &str) -> Result<Path, LeafRefError> {
        let mut elems = self.remote_path.elems().to_vec();
        let slot = elems.iter().enumerate().rev().find_map(|(i, elem)| {
            elem.keys()
                .iter()
                .rev()
                .find(|(_, v)| is_wildcard(v))
                .map(|(k, _)| (i, k.clone()))
        });
        let Some((index, key)) = slot else {
            return Err(LeafRefError::NoPlaceholder {
                remote_path: self.remote_path.to_canonical(),
            });
        };
        elems[index].set_key(key, value);
        Ok(Path::from_elems(elems))
    }
}

/// The outcome of checking one referring value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    /// Concrete path the value was found at.
    pub local_path: Path,
    /// The referring value.
    pub value: String,
    /// Path the value was expected to resolve to.
    pub remote_path: Path,
    /// Whether the remote path exists.
    pub resolved: bool,
}

/// Result of validating a tree against a set of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// `true` when every reference resolved.
    pub success: bool,
    pub results: Vec<ResolvedRef>,
}

impl Validation {
    /// Returns the references that did not resolve.
    pub fn failures(&self) -> impl Iterator<Item = &ResolvedRef> {
        self.results.iter().filter(|r| !r.resolved)
    }

    /// Renders the failures as a single human readable line.
    pub fn failure_message(&self) -> String {
        self.failures()
            .map(|r| format!("{} = {} does not resolve to {}", r.local_path, r.value, r.remote_path))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates every reference `rules` find in `local`.
///
/// In [`ValidationMode::External`] the referenced entries are looked up in
/// `external`, which must then be present.
pub fn validate(
    mode: ValidationMode,
    local: &ConfigTree,
    external: Option<&ConfigTree>,
    rules: &[ReferenceRule],
) -> Result<Validation, LeafRefError> {
    let target = match mode {
        ValidationMode::Local => local,
        ValidationMode::External => external.ok_or(LeafRefError::MissingExternalTree)?,
    };

    let mut results = Vec::new();
    for rule in rules {
        let mut found = Vec::new();
        expand(local, rule.local_path.elems(), Path::new(), &mut found);
        for (local_path, node) in found {
            for value in reference_values(node) {
                let remote_path = rule.remote_for(&value)?;
                let resolved = exists(target, &remote_path);
                debug!(%mode, local = %local_path, %value, remote = %remote_path, resolved, "Leaf-ref");
                results.push(ResolvedRef {
                    local_path: local_path.clone(),
                    value,
                    remote_path,
                    resolved,
                });
            }
        }
    }

    Ok(Validation {
        success: results.iter().all(|r| r.resolved),
        results,
    })
}

/// Returns `true` if `pattern` matches at least one node of `tree`.
pub fn exists(tree: &ConfigTree, pattern: &Path) -> bool {
    let mut found = Vec::new();
    expand(tree, pattern.elems(), Path::new(), &mut found);
    !found.is_empty()
}

/// Collects every node matching `pattern`, with its concrete path.
fn expand<'t>(
    node: &'t ConfigTree,
    pattern: &[PathElem],
    at: Path,
    out: &mut Vec<(Path, &'t ConfigTree)>,
) {
    let Some((elem, rest)) = pattern.split_first() else {
        out.push((at, node));
        return;
    };
    let Some(child) = node.get(elem.name()) else {
        return;
    };
    if !elem.is_keyed() {
        expand(child, rest, at.child(elem.name()), out);
        return;
    }

    let entries: &[ConfigTree] = match child {
        ConfigTree::List(items) => items,
        ConfigTree::Map(_) => std::slice::from_ref(child),
        _ => return,
    };
    for entry in entries {
        if let Some(concrete) = match_entry(entry, elem) {
            expand(entry, rest, at.child(concrete), out);
        }
    }
}

/// Returns the concrete element addressing `entry` if its keys match `elem`.
fn match_entry(entry: &ConfigTree, elem: &PathElem) -> Option<PathElem> {
    let mut concrete = PathElem::new(elem.name());
    for (key, expected) in elem.keys() {
        let actual = entry.get(key).and_then(ConfigTree::key_string)?;
        if !is_wildcard(expected) && actual != *expected {
            return None;
        }
        concrete = concrete.with_key(key.as_str(), actual);
    }
    Some(concrete)
}

/// Values a terminal node refers to: one per scalar, one per leaf-list element.
fn reference_values(node: &ConfigTree) -> Vec<String> {
    let values: Vec<String> = match node {
        ConfigTree::List(items) => items.iter().filter_map(ConfigTree::key_string).collect(),
        other => other.key_string().into_iter().collect(),
    };
    values.into_iter().filter(|v| !v.is_empty()).collect()
}
