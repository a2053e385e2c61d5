use std::io::Write;
use std::time::Duration;

use netconverge::config::{ConfigError, EngineConfig};
use netconverge::reconcile::{ReconcileOutcome, Reconciler, RecordingClient};
use netconverge::schema::SchemaRegistry;
use serde_json::json;
use tempfile::NamedTempFile;

use crate::helpers::*;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_engine_config_from_file() {
    let file = write_temp(
        r#"{
            "subscription": {"connect_timeout_ms": 250, "backoff": {"max_attempts": 2}},
            "schema_path": "/etc/netconverge/schemas.json"
        }"#,
    );
    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.subscription.connect_timeout(), Duration::from_millis(250));
    assert_eq!(config.subscription.backoff.max_attempts, 2);
    assert_eq!(config.subscription.receive_buffer, 1000);
    assert_eq!(
        config.schema_path.as_deref(),
        Some(std::path::Path::new("/etc/netconverge/schemas.json"))
    );
}

#[test]
fn test_engine_config_errors() {
    let missing = EngineConfig::load("/nonexistent/netconverge.json").unwrap_err();
    assert!(matches!(missing, ConfigError::Io { .. }));

    let file = write_temp("{ not json");
    assert!(matches!(
        EngineConfig::load(file.path()).unwrap_err(),
        ConfigError::Parse { .. }
    ));

    let file = write_temp(r#"{"subscription": {"receive_buffer": 0}}"#);
    let err = EngineConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "subscription.receive_buffer", .. }));
    let err: netconverge::Error = err.into();
    assert!(err.is_config_error());
}

#[tokio::test]
async fn test_loaded_schema_drives_reconciler() {
    let file = write_temp(
        r#"{
            "resources": [{
                "kind": "interface",
                "root_path": "configure.interface[name]",
                "reference_paths": ["configure.interface[name].subinterface[index]"],
                "markers": ["node"]
            }]
        }"#,
    );
    let registry = SchemaRegistry::load(file.path()).unwrap();
    let schema = registry.get("interface").unwrap();

    let reconciler = Reconciler::new(RecordingClient::new(), schema);
    let mut record = record(
        "interface",
        "eth0",
        json!({"node": "leaf1", "name": "eth0", "subinterface": [{"index": 0, "admin-state": "enable"}]}),
    );
    assert_eq!(reconciler.reconcile(&mut record).await.unwrap(), ReconcileOutcome::Created);

    let sets = reconciler.client().sets();
    assert_eq!(sets[0].prefix, path("configure.interface[name=eth0]"));
    assert!(sets[0].replace.iter().all(|pv| pv.path.to_canonical() != "node"));
}

#[test]
fn test_schema_load_errors() {
    let err = SchemaRegistry::load("/nonexistent/schemas.json").unwrap_err();
    assert!(err.is_load_error());
    let err: netconverge::Error = err.into();
    assert!(err.is_io_error());

    let file = write_temp(r#"{"resources": [{"kind": "a", "root_path": "x"}, {"kind": "a", "root_path": "y"}]}"#);
    assert!(SchemaRegistry::load(file.path()).is_err());
}
