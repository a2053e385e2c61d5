use netconverge::delta::{diff, reduce_prefix_maximal};
use netconverge::flatten::flatten;
use netconverge::tree::Path;
use serde_json::json;

use crate::helpers::*;

fn flat(value: serde_json::Value) -> Vec<netconverge::tree::PathValue> {
    let refs = refs(&["port[port-id]"]);
    flatten(&tree(value), &Path::new(), &refs).unwrap()
}

fn sample() -> serde_json::Value {
    json!({
        "port": [
            {"port-id": "1/1/1", "admin-state": "enable", "ethernet": {"mtu": 9000}},
            {"port-id": "1/1/2", "admin-state": "disable"}
        ]
    })
}

#[test]
fn test_diff_of_identical_trees_is_empty() {
    let delta = diff(&flat(sample()), &flat(sample()));
    assert!(delta.is_empty());
}

#[test]
fn test_diff_against_nothing_updates_every_leaf() {
    let desired = flat(sample());
    let delta = diff(&desired, &[]);
    assert_eq!(delta.updates, desired);
    assert!(delta.deletes.is_empty());
}

#[test]
fn test_diff_to_nothing_deletes_every_leaf() {
    let observed = flat(sample());
    let delta = diff(&[], &observed);
    assert!(delta.updates.is_empty());
    let leaves: Vec<Path> = observed.iter().map(|pv| pv.path.clone()).collect();
    assert_eq!(delta.deletes, reduce_prefix_maximal(leaves.clone()));
    assert_eq!(delta.deletes, leaves);
}

#[test]
fn test_diff_changed_and_removed_entries() {
    let observed = flat(sample());
    let desired = flat(json!({
        "port": [{"port-id": "1/1/1", "admin-state": "disable", "ethernet": {"mtu": 9000}}]
    }));

    let delta = diff(&desired, &observed);
    assert_eq!(delta.updates.len(), 1);
    assert_eq!(delta.updates[0].path, path("port[port-id=1/1/1].admin-state"));
    assert_eq!(delta.updates[0].value, "disable");
    assert_eq!(
        canonical(&delta.deletes),
        vec!["port[port-id=1/1/2].admin-state", "port[port-id=1/1/2].port-id"]
    );
}

#[test]
fn test_merged_deletes_stay_prefix_maximal() {
    let mut delta = diff(&[], &flat(sample()));
    delta.merge_deletes([path("port[port-id=1/1/2]")]);
    assert_eq!(
        canonical(&delta.deletes),
        vec![
            "port[port-id=1/1/1].admin-state",
            "port[port-id=1/1/1].ethernet.mtu",
            "port[port-id=1/1/1].port-id",
            "port[port-id=1/1/2]",
        ]
    );
}
