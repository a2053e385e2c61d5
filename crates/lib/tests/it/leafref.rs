use netconverge::leafref::{LeafRefError, ValidationMode, exists, validate};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_local_rule_fails_until_entry_exists() {
    let rules = [rule("a.b.ref", "a.c[key]")];

    let missing = tree(json!({"a": {"b": {"ref": "x"}}}));
    let result = validate(ValidationMode::Local, &missing, None, &rules).unwrap();
    assert!(!result.success);
    assert_eq!(result.failures().count(), 1);
    assert_eq!(result.results[0].remote_path, path("a.c[key=x]"));

    let present = tree(json!({"a": {"b": {"ref": "x"}, "c": [{"key": "x"}]}}));
    let result = validate(ValidationMode::Local, &present, None, &rules).unwrap();
    assert!(result.success);
    assert!(result.failure_message().is_empty());
}

#[test]
fn test_external_rule_checks_supplied_tree() {
    let rules = [rule("interface.lag", "configure.lag[lag-name]")];
    let local = tree(json!({"interface": {"lag": "lag-1"}}));
    let config = tree(json!({"configure": {"lag": [{"lag-name": "lag-1"}, {"lag-name": "lag-2"}]}}));

    let result = validate(ValidationMode::External, &local, Some(&config), &rules).unwrap();
    assert!(result.success);

    let empty = tree(json!({"configure": {}}));
    let result = validate(ValidationMode::External, &local, Some(&empty), &rules).unwrap();
    assert!(!result.success);
    assert!(result.failure_message().contains("configure.lag[lag-name=lag-1]"));
}

#[test]
fn test_external_mode_needs_a_tree() {
    let err = validate(
        ValidationMode::External,
        &tree(json!({})),
        None,
        &[rule("a", "b[k]")],
    )
    .unwrap_err();
    assert_eq!(err, LeafRefError::MissingExternalTree);
}

#[test]
fn test_star_placeholder_resolves_and_fails() {
    let rules = [rule("a.b.ref", "a.c[key=*]")];

    let present = tree(json!({"a": {"b": {"ref": "x"}, "c": [{"key": "x"}]}}));
    let result = validate(ValidationMode::Local, &present, None, &rules).unwrap();
    assert!(result.success);
    assert_eq!(result.results[0].remote_path, path("a.c[key=x]"));

    let missing = tree(json!({"a": {"b": {"ref": "x"}, "c": [{"key": "y"}]}}));
    let result = validate(ValidationMode::Local, &missing, None, &rules).unwrap();
    assert!(!result.success);
    assert_eq!(result.failures().count(), 1);
}

#[test]
fn test_star_placeholder_in_external_mode() {
    let config = tree(json!({"port": [{"port-id": "1/1/1"}]}));
    let local = tree(json!({"sap": {"port": "1/1/1"}}));
    let result = validate(
        ValidationMode::External,
        &local,
        Some(&config),
        &[rule("sap.port", "port[port-id=*]")],
    )
    .unwrap();
    assert!(result.success);
}

#[test]
fn test_rule_without_placeholder_is_rejected() {
    let local = tree(json!({"a": "x"}));
    let err = validate(ValidationMode::Local, &local, None, &[rule("a", "b[k=fixed]")]).unwrap_err();
    assert!(err.is_rule_error());
}

#[test]
fn test_exists_with_patterns() {
    let config = tree(json!({"port": [{"id": "p1", "mtu": 1500}, {"id": "p2"}]}));
    assert!(exists(&config, &path("port[id=p1].mtu")));
    assert!(exists(&config, &path("port[id]")));
    assert!(!exists(&config, &path("port[id=p2].mtu")));
    assert!(!exists(&config, &path("lag")));
}
