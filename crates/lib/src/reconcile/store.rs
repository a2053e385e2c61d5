//! The desired-state seam.
//!
//! Desired state lives in an external declarative store. The engine sees
//! one record per resource through [`DesiredState`] and writes back the
//! index map and conditions it computes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::conditions::{Condition, ConditionKind, merge_conditions};
use crate::index::ResourceIndexMap;
use crate::tree::ConfigTree;

/// Identifies a resource: its schema kind and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub kind: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A desired-state record as seen by the reconciler.
pub trait DesiredState: Send + Sync {
    fn identity(&self) -> &ResourceIdentity;

    /// The operator's desired tree, markers included.
    fn desired_tree(&self) -> ConfigTree;

    /// The index map persisted by the previous cycle.
    fn index_map(&self) -> ResourceIndexMap;

    fn set_index_map(&mut self, map: ResourceIndexMap);

    fn set_conditions(&mut self, conditions: Vec<Condition>);

    /// Returns `true` once the operator asked for the resource to go away.
    fn deletion_requested(&self) -> bool;
}

/// An in-memory [`DesiredState`] record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    identity: ResourceIdentity,
    desired: ConfigTree,
    index_map: ResourceIndexMap,
    conditions: Vec<Condition>,
    deletion_requested: bool,
}

impl MemoryStore {
    pub fn new(identity: ResourceIdentity, desired: ConfigTree) -> Self {
        Self {
            identity,
            desired,
            index_map: ResourceIndexMap::new(),
            conditions: Vec::new(),
            deletion_requested: false,
        }
    }

    pub fn with_index_map(mut self, map: ResourceIndexMap) -> Self {
        self.index_map = map;
        self
    }

    /// Replaces the desired tree, as an operator edit would.
    pub fn set_desired(&mut self, desired: ConfigTree) {
        self.desired = desired;
    }

    pub fn request_deletion(&mut self) {
        self.deletion_requested = true;
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn condition(&self, kind: ConditionKind) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }
}

impl DesiredState for MemoryStore {
    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn desired_tree(&self) -> ConfigTree {
        self.desired.clone()
    }

    fn index_map(&self) -> ResourceIndexMap {
        self.index_map.clone()
    }

    fn set_index_map(&mut self, map: ResourceIndexMap) {
        self.index_map = map;
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        merge_conditions(&mut self.conditions, conditions);
    }

    fn deletion_requested(&self) -> bool {
        self.deletion_requested
    }
}
