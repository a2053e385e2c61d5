//! Configuration trees and the paths that address them.
//!
//! Everything the engine reads or writes is a [`ConfigTree`]: the desired
//! state declared by an operator, the observed state returned by a remote
//! element, and the external tree used for cross-resource references.
//! Individual nodes are addressed with a [`Path`].

pub mod path;
pub mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use path::{Path, PathElem, PathError, is_wildcard};
pub use value::ConfigTree;

/// A path together with the terminal value found at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: Path,
    pub value: ConfigTree,
}

impl PathValue {
    pub fn new(path: Path, value: impl Into<ConfigTree>) -> Self {
        Self {
            path,
            value: value.into(),
        }
    }
}

impl fmt::Display for PathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.path, self.value)
    }
}
