use netconverge::flatten::{
    FlattenError, Flattener, ReferencePaths, flatten, normalize_entry_lists, strip_markers, unflatten,
};
use netconverge::tree::Path;
use serde_json::json;

use crate::helpers::*;

fn rendered(updates: &[netconverge::tree::PathValue]) -> Vec<String> {
    updates.iter().map(ToString::to_string).collect()
}

#[test]
fn test_flatten_relative_to_keyed_root() {
    let refs = refs(&["configure.interface[name]", "configure.interface[name].subinterface[index]"]);
    let root = path("configure.interface[name=eth0]");
    let desired = tree(json!({
        "description": "uplink",
        "subinterface": [
            {"index": 0, "ipv4": {"address": "10.0.0.1/31"}},
            {"index": 1, "admin-state": "disable"}
        ]
    }));

    let updates = flatten(&desired, &root, &refs).unwrap();
    assert_eq!(
        rendered(&updates),
        vec![
            "description = \"uplink\"",
            "subinterface[index=0].index = 0",
            "subinterface[index=0].ipv4.address = \"10.0.0.1/31\"",
            "subinterface[index=1].admin-state = \"disable\"",
            "subinterface[index=1].index = 1",
        ]
    );
}

#[test]
fn test_flatten_unflatten_is_lossless() {
    let refs = refs(&["list[name]", "list[name].nested[a,b]"]);
    let original = tree(json!({
        "list": [
            {"name": "x", "mtu": 1500, "nested": [{"a": "1", "b": "2", "v": true}]},
            {"name": "y", "tags": ["red", "blue"]}
        ],
        "scalar": "s"
    }));

    let updates = Flattener::new(&refs).flatten(&original, &Path::new()).unwrap();
    assert_eq!(unflatten(&updates), original);
}

#[test]
fn test_undeclared_list_of_maps_is_decode_error() {
    let desired = tree(json!({"list": [{"name": "x"}]}));
    let err = flatten(&desired, &path("configure"), &ReferencePaths::new()).unwrap_err();
    assert!(matches!(err, FlattenError::UndeclaredList { .. }));
    assert_eq!(err.path(), "configure.list");
}

#[test]
fn test_entry_missing_key_is_decode_error() {
    let refs = refs(&["list[name]"]);
    let err = flatten(&tree(json!({"list": [{"mtu": 1}]})), &Path::new(), &refs).unwrap_err();
    assert!(err.is_key_error());
    assert!(matches!(err, FlattenError::MissingKey { ref key, .. } if key == "name"));
}

#[test]
fn test_markers_never_reach_updates() {
    let desired = tree(json!({"node": "leaf1", "port": {"node": "x", "adminState": "enable"}}));
    let stripped = strip_markers(&desired, &["node".to_string()]);
    let updates = flatten(&stripped, &Path::new(), &ReferencePaths::new()).unwrap();
    assert_eq!(rendered(&updates), vec!["port.adminState = \"enable\""]);
}

#[test]
fn test_observed_single_entry_flattens_like_desired() {
    let refs = refs(&["configure.port[port-id]"]);
    let root = path("configure");
    let desired = tree(json!({"port": [{"port-id": "1/1/1", "mtu": 9000}]}));
    // element returned the lone entry without its list
    let observed = tree(json!({"port": {"port-id": "1/1/1", "mtu": 9000}}));

    let normalized = normalize_entry_lists(&observed, &root, &refs);
    assert_eq!(normalized, desired);
    assert_eq!(
        flatten(&normalized, &root, &refs).unwrap(),
        flatten(&desired, &root, &refs).unwrap()
    );
}

#[test]
fn test_reference_paths_from_json() {
    let refs: ReferencePaths =
        serde_json::from_str(r#"["configure.port[port-id]", "configure.lag[lag-name]"]"#).unwrap();
    assert_eq!(refs.len(), 2);
    assert!(refs.is_declared(&path("configure.port[port-id=1/1/1]")));
    assert_eq!(refs.keys_for(&path("configure.lag")), Some(&["lag-name".to_string()][..]));
    assert!(!refs.is_declared(&path("configure.router")));
    assert!(serde_json::from_str::<ReferencePaths>(r#"["a[b"]"#).is_err());
}
