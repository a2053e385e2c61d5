use std::str::FromStr;

use netconverge::{
    flatten::ReferencePaths,
    index::ResourceIndexMap,
    leafref::ReferenceRule,
    reconcile::{MemoryStore, ResourceIdentity},
    schema::ResourceSchema,
    tree::{ConfigTree, Path},
};

// ==========================
// TREE AND PATH FACTORIES
// ==========================

/// Parses a canonical path, panicking on bad input.
pub fn path(s: &str) -> Path {
    Path::from_str(s).unwrap_or_else(|e| panic!("bad test path '{s}': {e}"))
}

/// Builds a tree from a `serde_json::json!` value.
pub fn tree(value: serde_json::Value) -> ConfigTree {
    ConfigTree::from(value)
}

pub fn refs(paths: &[&str]) -> ReferencePaths {
    ReferencePaths::parse(paths.iter().copied()).expect("bad reference path")
}

pub fn rule(local: &str, remote: &str) -> ReferenceRule {
    ReferenceRule::new(path(local), path(remote))
}

pub fn index_map(entries: &[(&str, &str)]) -> ResourceIndexMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Canonical strings of a list of paths, for compact assertions.
pub fn canonical(paths: &[Path]) -> Vec<String> {
    paths.iter().map(Path::to_canonical).collect()
}

// ==========================
// SCHEMA AND RECORD FACTORIES
// ==========================

/// A resource rooted at `configure` with no lists.
pub fn port_schema() -> ResourceSchema {
    ResourceSchema::new("port", path("configure"))
}

/// A resource rooted at one interface entry. The interface name is taken
/// from the desired tree's `name` field, and `node` is a marker.
pub fn interface_schema() -> ResourceSchema {
    ResourceSchema::new("interface", path("configure.interface[name]"))
        .with_reference_paths(refs(&[
            "configure.interface[name]",
            "configure.interface[name].subinterface[index]",
        ]))
        .with_markers(vec!["node".to_string()])
}

pub fn record(kind: &str, name: &str, desired: serde_json::Value) -> MemoryStore {
    MemoryStore::new(ResourceIdentity::new(kind, name), tree(desired))
}
