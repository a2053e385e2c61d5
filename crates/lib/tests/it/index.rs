use netconverge::index::{IndexTracker, ResourceIndexMap};
use netconverge::tree::Path;
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_renamed_entry_is_deleted() {
    let refs = refs(&["a.list[key]"]);
    let current = tree(json!({"a": {"list": [{"key": "new"}]}}));
    let change = IndexTracker::new(&refs).track(&Path::new(), &index_map(&[("a.list[key]", "old")]), &current);

    assert!(change.changed);
    assert_eq!(canonical(&change.delete_paths), vec!["a.list[key=old]"]);
    assert_eq!(change.next, index_map(&[("a.list[key]", "new")]));
}

#[test]
fn test_unchanged_key_is_stable() {
    let refs = refs(&["a.list[key]"]);
    let current = tree(json!({"a": {"list": [{"key": "same", "v": 1}]}}));
    let previous = index_map(&[("a.list[key]", "same")]);
    let change = IndexTracker::new(&refs).track(&Path::new(), &previous, &current);

    assert!(!change.changed);
    assert!(change.delete_paths.is_empty());
    assert_eq!(change.next, previous);
}

#[test]
fn test_positions_are_relative_to_root() {
    let refs = refs(&[
        "configure.interface[name]",
        "configure.interface[name].subinterface[index]",
    ]);
    let root = path("configure.interface[name=eth0]");
    let current = tree(json!({"name": "eth0", "subinterface": [{"index": 1}]}));
    let previous = index_map(&[("subinterface[index]", "0")]);

    let change = IndexTracker::new(&refs).track(&root, &previous, &current);
    assert!(change.changed);
    assert_eq!(canonical(&change.delete_paths), vec!["subinterface[index=0]"]);
    assert_eq!(change.next, index_map(&[("subinterface[index]", "1")]));
}

#[test]
fn test_nested_renames_delete_the_old_outer_entry() {
    let refs = refs(&["outer[id]", "outer[id].inner[id]"]);
    let current = tree(json!({"outer": [{"id": "b", "inner": [{"id": "y"}]}]}));
    let previous = index_map(&[("outer[id]", "a"), ("outer[id].inner[id]", "x")]);

    let change = IndexTracker::new(&refs).track(&Path::new(), &previous, &current);
    assert!(change.changed);
    // the old inner entry lived under outer[id=a] and goes with it
    assert_eq!(canonical(&change.delete_paths), vec!["outer[id=a]"]);
    assert_eq!(
        change.next,
        index_map(&[("outer[id]", "b"), ("outer[id].inner[id]", "y")])
    );
}

#[test]
fn test_inner_rename_under_stable_outer() {
    let refs = refs(&["outer[id]", "outer[id].inner[id]"]);
    let current = tree(json!({"outer": [{"id": "a", "inner": [{"id": "y"}]}]}));
    let previous = index_map(&[("outer[id]", "a"), ("outer[id].inner[id]", "x")]);

    let change = IndexTracker::new(&refs).track(&Path::new(), &previous, &current);
    assert_eq!(canonical(&change.delete_paths), vec!["outer[id=a].inner[id=x]"]);
}

#[test]
fn test_key_values_with_commas() {
    let refs = refs(&["list[k]"]);
    let current = tree(json!({"list": [{"k": "new"}]}));
    let change = IndexTracker::new(&refs).track(&Path::new(), &index_map(&[("list[k]", "a,b")]), &current);

    assert!(change.changed);
    assert_eq!(canonical(&change.delete_paths), vec![r"list[k=a\,b]"]);
    assert_eq!(change.next, index_map(&[("list[k]", "new")]));
}

#[test]
fn test_multi_key_values_with_commas() {
    let refs = refs(&["list[a,b]"]);
    let current = tree(json!({"list": [{"a": "x,y", "b": "2"}]}));
    let previous = index_map(&[("list[a,b]", r#"["x,y","1"]"#)]);
    let change = IndexTracker::new(&refs).track(&Path::new(), &previous, &current);

    assert!(change.changed);
    assert_eq!(canonical(&change.delete_paths), vec![r"list[a=x\,y,b=1]"]);
    assert_eq!(change.next, index_map(&[("list[a,b]", r#"["x,y","2"]"#)]));
}

#[test]
fn test_empty_previous_map_records_current_keys() {
    let refs = refs(&["port[port-id]"]);
    let current = tree(json!({"port": [{"port-id": "1/1/1"}]}));
    let change = IndexTracker::new(&refs).track(&Path::new(), &ResourceIndexMap::new(), &current);

    assert!(!change.changed);
    assert_eq!(change.next, index_map(&[("port[port-id]", "1/1/1")]));
}
