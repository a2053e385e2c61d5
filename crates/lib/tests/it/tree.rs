use netconverge::tree::{ConfigTree, Path, PathElem, PathValue};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_entry_paths_built_and_parsed_agree() {
    let built = Path::new()
        .push("configure")
        .push(PathElem::new("router").with_key("router-name", "Base"))
        .push(PathElem::new("interface").with_key("interface-name", "system"))
        .push("admin-state");
    let parsed = path("configure.router[router-name=Base].interface[interface-name=system].admin-state");

    assert_eq!(built, parsed);
    assert_eq!(parsed.len(), 4);
    assert_eq!(parsed.elems()[1].key("router-name"), Some("Base"));
    assert_eq!(
        parsed.structural().to_canonical(),
        "configure.router[router-name].interface[interface-name].admin-state"
    );
}

#[test]
fn test_relative_paths_against_root() {
    let root = path("configure.port[port-id=1/1/1]");
    let leaf = path("configure.port[port-id=1/1/1].ethernet.mtu");

    assert!(root.is_prefix_of(&leaf));
    assert!(root.is_prefix_of(&root));
    assert!(!leaf.is_prefix_of(&root));
    let rel = leaf.strip_prefix(&root).unwrap();
    assert_eq!(rel.to_canonical(), "ethernet.mtu");
    assert_eq!(root.clone().join(&rel), leaf);
}

#[test]
fn test_tree_json_round_trip() {
    let original = json!({
        "port": [{"port-id": "1/1/1", "mtu": 9000, "enabled": true}],
        "description": null,
        "tags": ["a", "b"]
    });
    let tree = tree(original.clone());
    assert!(tree.is_map());
    assert_eq!(tree.get("port").and_then(ConfigTree::as_list).map(|l| l.len()), Some(1));
    assert_eq!(serde_json::Value::from(tree.clone()), original);

    let text = tree.to_json_string();
    assert_eq!(ConfigTree::from_json_str(&text).unwrap(), tree);
}

#[test]
fn test_path_value_display() {
    let update = PathValue::new(path("port.adminState"), "enable");
    assert_eq!(update.to_string(), "port.adminState = \"enable\"");

    let update = PathValue::new(path("port.mtu"), 9000i64);
    assert_eq!(update.to_string(), "port.mtu = 9000");
}
