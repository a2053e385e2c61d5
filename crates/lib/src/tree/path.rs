//! Path types for addressing nodes in a configuration tree.
//!
//! A [`Path`] is an ordered sequence of [`PathElem`]s. Each element has a
//! name and an optional key-map that selects one entry of a list node. Paths
//! have a canonical string form that is used for display, for parsing, and
//! as the map key whenever two trees are compared.
//!
//! # Canonical form
//!
//! Elements are separated by dots. A keyed element is followed by its keys
//! in brackets, sorted by key name:
//!
//! ```rust
//! use netconverge::tree::{Path, PathElem};
//! use std::str::FromStr;
//!
//! let path = Path::new()
//!     .push("interface")
//!     .push(PathElem::new("subinterface").with_key("index", "0"))
//!     .push("admin-state");
//! assert_eq!(path.to_canonical(), "interface.subinterface[index=0].admin-state");
//!
//! let parsed = Path::from_str("interface.subinterface[index=0].admin-state")?;
//! assert_eq!(parsed, path);
//! # Ok::<(), netconverge::tree::PathError>(())
//! ```
//!
//! A key without a value (`list[name]`) is a placeholder. Placeholders are
//! how the structural form of a path is written, and how reference tables
//! and leaf-ref patterns say "any entry of this list". Inside key values the
//! characters `\`, `]` and `,` are escaped with a backslash.

use std::{collections::BTreeMap, fmt, iter::Peekable, str::Chars, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for path parsing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// An element could not be parsed.
    #[error("Invalid path element '{element}': {reason}")]
    InvalidElement { element: String, reason: String },

    /// A key block was opened but never closed.
    #[error("Unterminated key in path '{path}'")]
    UnterminatedKey { path: String },
}

impl From<PathError> for crate::Error {
    fn from(err: PathError) -> Self {
        crate::Error::Path(err)
    }
}

/// Returns true if a key value in a pattern matches any list entry.
pub fn is_wildcard(value: &str) -> bool {
    value.is_empty() || value == "*"
}

/// A single element of a [`Path`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathElem {
    name: String,
    keys: BTreeMap<String, String>,
}

impl PathElem {
    /// Creates an element without keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: BTreeMap::new(),
        }
    }

    /// Adds a key to this element.
    pub fn with_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(key.into(), value.into());
        self
    }

    /// Replaces the key-map of this element.
    pub fn with_keys(mut self, keys: BTreeMap<String, String>) -> Self {
        self.keys = keys;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &BTreeMap<String, String> {
        &self.keys
    }

    /// Returns the value of a single key, if present.
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Returns `true` if this element addresses a list entry.
    pub fn is_keyed(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Returns the key names in sorted order.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Returns a copy of this element with every key value blanked.
    pub fn structural(&self) -> PathElem {
        PathElem {
            name: self.name.clone(),
            keys: self
                .keys
                .keys()
                .map(|k| (k.clone(), String::new()))
                .collect(),
        }
    }

    /// Sets the value of an existing or new key.
    pub(crate) fn set_key(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.insert(key.into(), value.into());
    }

    fn write_canonical(&self, out: &mut String) {
        out.push_str(&self.name);
        if self.keys.is_empty() {
            return;
        }
        out.push('[');
        for (i, (key, value)) in self.keys.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(key);
            if !value.is_empty() {
                out.push('=');
                for c in value.chars() {
                    if matches!(c, '\\' | ']' | ',') {
                        out.push('\\');
                    }
                    out.push(c);
                }
            }
        }
        out.push(']');
    }
}

impl From<&str> for PathElem {
    fn from(name: &str) -> Self {
        PathElem::new(name)
    }
}

impl From<String> for PathElem {
    fn from(name: String) -> Self {
        PathElem::new(name)
    }
}

impl fmt::Display for PathElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_canonical(&mut out);
        f.write_str(&out)
    }
}

/// An owned path into a configuration tree.
///
/// Paths compare structurally: two paths are equal when their element names
/// and key-maps are equal. The canonical string is a faithful encoding of the
/// structure, so it can stand in for the path wherever a string key is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    elems: Vec<PathElem>,
}

impl Path {
    /// Creates a new empty path.
    pub fn new() -> Self {
        Self { elems: Vec::new() }
    }

    /// Creates a path from already-built elements.
    pub fn from_elems(elems: Vec<PathElem>) -> Self {
        Self { elems }
    }

    /// Adds an element to the end of this path.
    pub fn push(mut self, elem: impl Into<PathElem>) -> Self {
        self.elems.push(elem.into());
        self
    }

    /// Returns a new path with `elem` appended, leaving `self` untouched.
    pub fn child(&self, elem: impl Into<PathElem>) -> Self {
        self.clone().push(elem)
    }

    /// Joins this path with another path.
    pub fn join(mut self, other: &Path) -> Self {
        self.elems.extend(other.elems.iter().cloned());
        self
    }

    pub fn elems(&self) -> &[PathElem] {
        &self.elems
    }

    /// Returns the number of elements in the path.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Returns `true` if the path has no elements.
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Returns the parent path, or `None` if this is the root.
    pub fn parent(&self) -> Option<Path> {
        if self.elems.is_empty() {
            return None;
        }
        Some(Path {
            elems: self.elems[..self.elems.len() - 1].to_vec(),
        })
    }

    /// Returns the last element of the path, or `None` if empty.
    pub fn last(&self) -> Option<&PathElem> {
        self.elems.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut PathElem> {
        self.elems.last_mut()
    }

    /// Returns `true` if any element of the path carries keys.
    pub fn has_keys(&self) -> bool {
        self.elems.iter().any(PathElem::is_keyed)
    }

    /// Returns the structural form of the path: key names are kept, key
    /// values are blanked.
    pub fn structural(&self) -> Path {
        Path {
            elems: self.elems.iter().map(PathElem::structural).collect(),
        }
    }

    /// Returns `true` if `prefix` is equal to or an ancestor of this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.elems.len() <= self.elems.len() && self.elems[..prefix.elems.len()] == prefix.elems
    }

    /// Returns `true` if this path is equal to or an ancestor of `other`.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.starts_with(self)
    }

    /// Returns `true` if this path is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.elems.len() < other.elems.len() && other.starts_with(self)
    }

    /// Returns the remainder of this path after `prefix`.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Path {
            elems: self.elems[prefix.elems.len()..].to_vec(),
        })
    }

    /// Returns the canonical string form. The empty path is `""`.
    pub fn to_canonical(&self) -> String {
        let mut out = String::new();
        for (i, elem) in self.elems.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            elem.write_canonical(&mut out);
        }
        out
    }
}

impl From<Vec<PathElem>> for Path {
    fn from(elems: Vec<PathElem>) -> Self {
        Path::from_elems(elems)
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_path(s).map(Path::from_elems)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Path::from_str(&s)
    }
}

impl TryFrom<&str> for Path {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Path::from_str(s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_canonical()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elems.is_empty() {
            write!(f, "(empty path)")
        } else {
            f.write_str(&self.to_canonical())
        }
    }
}

/// Parses a canonical path string.
///
/// Empty elements are skipped, so `".a..b."` parses the same as `"a.b"`.
fn parse_path(input: &str) -> Result<Vec<PathElem>, PathError> {
    let mut elems = Vec::new();
    let mut chars = input.chars().peekable();
    let mut current = PathElem::default();

    loop {
        match chars.next() {
            None => {
                flush_elem(&mut elems, &mut current)?;
                return Ok(elems);
            }
            Some('.') => flush_elem(&mut elems, &mut current)?,
            Some('[') => {
                if current.name.is_empty() {
                    return Err(PathError::InvalidElement {
                        element: input.to_string(),
                        reason: "key block without element name".to_string(),
                    });
                }
                for (key, value) in parse_keys(&mut chars, input)? {
                    current.keys.insert(key, value);
                }
            }
            Some(']') => {
                return Err(PathError::InvalidElement {
                    element: current.name,
                    reason: "unexpected ']'".to_string(),
                });
            }
            Some(c) => {
                if current.is_keyed() {
                    return Err(PathError::InvalidElement {
                        element: current.name,
                        reason: format!("unexpected '{c}' after key block"),
                    });
                }
                current.name.push(c);
            }
        }
    }
}

fn flush_elem(elems: &mut Vec<PathElem>, current: &mut PathElem) -> Result<(), PathError> {
    let elem = std::mem::take(current);
    if elem.name.is_empty() {
        return Ok(());
    }
    elems.push(elem);
    Ok(())
}

/// Parses the inside of a `[...]` block; the opening bracket is consumed.
fn parse_keys(chars: &mut Peekable<Chars<'_>>, input: &str) -> Result<Vec<(String, String)>, PathError> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;

    let finish = |key: &mut String, value: &mut String, pairs: &mut Vec<(String, String)>| {
        if key.is_empty() {
            return Err(PathError::InvalidElement {
                element: input.to_string(),
                reason: "empty key name".to_string(),
            });
        }
        pairs.push((std::mem::take(key), std::mem::take(value)));
        Ok(())
    };

    loop {
        match chars.next() {
            None => {
                return Err(PathError::UnterminatedKey {
                    path: input.to_string(),
                });
            }
            Some('\\') if in_value => match chars.next() {
                Some(c) => value.push(c),
                None => {
                    return Err(PathError::UnterminatedKey {
                        path: input.to_string(),
                    });
                }
            },
            Some('=') if !in_value => in_value = true,
            Some(',') => {
                finish(&mut key, &mut value, &mut pairs)?;
                in_value = false;
            }
            Some(']') => {
                finish(&mut key, &mut value, &mut pairs)?;
                return Ok(pairs);
            }
            Some(c) if in_value => value.push(c),
            Some(c) => key.push(c),
        }
    }
}
