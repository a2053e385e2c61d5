//! Per-resource schema data.
//!
//! Everything the engine needs to know about a resource type is data: where
//! it lives on the element, which lists hold keyed entries, which leaf
//! references must resolve, and which marker fields to strip. A
//! [`SchemaRegistry`] holds one [`ResourceSchema`] per kind and is built
//! once at start-up from a JSON document:
//!
//! ```json
//! {
//!   "resources": [
//!     {
//!       "kind": "port",
//!       "root_path": "configure.port[port-id]",
//!       "level": 1,
//!       "reference_paths": ["configure.port[port-id]"],
//!       "markers": ["port-id"]
//!     }
//!   ]
//! }
//! ```

use std::{collections::BTreeMap, path::Path as FsPath};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::flatten::ReferencePaths;
use crate::leafref::ReferenceRule;
use crate::tree::{ConfigTree, Path, PathElem};

/// Errors from loading or querying schemas.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// The schema file could not be read.
    #[error("Failed to read schema file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The schema document is not valid.
    #[error("Invalid schema document: {0}")]
    Parse(#[from] serde_json::Error),

    /// No schema is registered for the kind.
    #[error("Unknown resource kind '{kind}'")]
    UnknownKind { kind: String },

    /// Two schemas were registered for the same kind.
    #[error("Resource kind '{kind}' is registered twice")]
    DuplicateKind { kind: String },

    /// A root path key could not be filled from the desired tree.
    #[error("Root path of '{kind}' needs key '{key}', not found in the desired tree")]
    UnresolvedRoot { kind: String, key: String },
}

impl SchemaError {
    /// Check if this error indicates a missing kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchemaError::UnknownKind { .. })
    }

    /// Check if this error came from reading or parsing a document.
    pub fn is_load_error(&self) -> bool {
        matches!(self, SchemaError::Io { .. } | SchemaError::Parse(_))
    }
}

impl From<SchemaError> for crate::Error {
    fn from(err: SchemaError) -> Self {
        crate::Error::Schema(err)
    }
}

/// The data describing one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// Resource kind, unique within a registry.
    pub kind: String,
    /// Where the resource lives on the element. Empty key values are filled
    /// from the desired tree's top-level fields.
    pub root_path: Path,
    /// Depth of the resource in the dependency hierarchy.
    #[serde(default)]
    pub level: u32,
    /// Absolute structural paths of keyed lists.
    #[serde(default)]
    pub reference_paths: ReferencePaths,
    /// Rules resolved within the resource's own tree.
    #[serde(default)]
    pub local_leafrefs: Vec<ReferenceRule>,
    /// Rules resolved against the element's full configuration.
    #[serde(default)]
    pub external_leafrefs: Vec<ReferenceRule>,
    /// Fields used only for dependency resolution, never sent to the element.
    #[serde(default)]
    pub markers: Vec<String>,
}

impl ResourceSchema {
    /// Creates a schema with no tables.
    pub fn new(kind: impl Into<String>, root_path: Path) -> Self {
        Self {
            kind: kind.into(),
            root_path,
            level: 0,
            reference_paths: ReferencePaths::new(),
            local_leafrefs: Vec::new(),
            external_leafrefs: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub fn with_reference_paths(mut self, refs: ReferencePaths) -> Self {
        self.reference_paths = refs;
        self
    }

    pub fn with_local_leafrefs(mut self, rules: Vec<ReferenceRule>) -> Self {
        self.local_leafrefs = rules;
        self
    }

    pub fn with_external_leafrefs(mut self, rules: Vec<ReferenceRule>) -> Self {
        self.external_leafrefs = rules;
        self
    }

    pub fn with_markers(mut self, markers: Vec<String>) -> Self {
        self.markers = markers;
        self
    }

    /// Returns the concrete root path for a desired tree.
    ///
    /// Each empty key value in `root_path` is taken from the field of the
    /// same name at the top of `desired`.
    pub fn resolve_root(&self, desired: &ConfigTree) -> Result<Path, SchemaError> {
        let mut elems = Vec::with_capacity(self.root_path.len());
        for elem in self.root_path.elems() {
            let mut resolved = PathElem::new(elem.name());
            for (key, value) in elem.keys() {
                let value = if value.is_empty() {
                    desired
                        .get(key)
                        .and_then(ConfigTree::key_string)
                        .ok_or_else(|| SchemaError::UnresolvedRoot {
                            kind: self.kind.clone(),
                            key: key.clone(),
                        })?
                } else {
                    value.clone()
                };
                resolved = resolved.with_key(key.as_str(), value);
            }
            elems.push(resolved);
        }
        Ok(Path::from_elems(elems))
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct SchemaDocument {
    resources: Vec<ResourceSchema>,
}

/// All resource schemas known to a process, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    kinds: BTreeMap<String, ResourceSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a registry from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for schema in document.resources {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Loads a registry from a JSON file.
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_json(&json)?;
        info!(path = %path.display(), kinds = registry.len(), "Loaded resource schemas");
        Ok(registry)
    }

    /// Adds a schema. Each kind may only be registered once.
    pub fn register(&mut self, schema: ResourceSchema) -> Result<(), SchemaError> {
        if self.kinds.contains_key(&schema.kind) {
            return Err(SchemaError::DuplicateKind { kind: schema.kind });
        }
        self.kinds.insert(schema.kind.clone(), schema);
        Ok(())
    }

    /// Returns the schema for `kind`.
    pub fn get(&self, kind: &str) -> Result<&ResourceSchema, SchemaError> {
        self.kinds.get(kind).ok_or_else(|| SchemaError::UnknownKind {
            kind: kind.to_string(),
        })
    }

    /// Iterates over the schemas in kind order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceSchema> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
