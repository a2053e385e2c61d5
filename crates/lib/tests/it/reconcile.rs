use std::sync::Arc;

use netconverge::FixedClock;
use netconverge::reconcile::{
    Action, Call, ConditionKind, ConditionStatus, DesiredState, FanOut, Observation, ReconcileError,
    ReconcileOutcome, Reconciler, RecordingClient, Registration, RegistrationState, Status,
};
use netconverge::tree::{ConfigTree, Path, PathValue};
use serde_json::json;

use crate::helpers::*;

fn port_record() -> netconverge::reconcile::MemoryStore {
    record("port", "p1", json!({"port": {"adminState": "enable"}}))
}

#[tokio::test]
async fn test_cache_not_ready_only_reads() {
    let schema = port_schema();
    let reconciler = Reconciler::new(RecordingClient::new().with_cache_ready(false), &schema);
    let mut record = port_record();

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::NotReady);

    let calls = reconciler.client().calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], Call::Get { envelope, .. } if envelope.action == Action::Get));

    let ready = record.condition(ConditionKind::Ready).unwrap();
    assert_eq!(ready.status, ConditionStatus::Unknown);
    assert_eq!(ready.reason, "CacheNotReady");
    assert!(record.condition(ConditionKind::Synced).unwrap().is_true());
}

#[tokio::test]
async fn test_absent_resource_is_created_with_replace() {
    let schema = port_schema();
    let reconciler = Reconciler::new(RecordingClient::new(), &schema);
    let mut record = port_record();

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);

    let sets = reconciler.client().sets();
    assert_eq!(sets.len(), 1);
    let set = &sets[0];
    assert_eq!(set.envelope.action, Action::Create);
    assert_eq!(set.prefix, path("configure"));
    assert_eq!(set.replace, vec![PathValue::new(path("port.adminState"), "enable")]);
    assert!(set.updates.is_empty());
    assert!(set.deletes.is_empty());
    assert_eq!(record.condition(ConditionKind::Ready).unwrap().reason, "Creating");
}

#[tokio::test]
async fn test_stale_resource_gets_delta() {
    let schema = port_schema();
    let observed = tree(json!({"port": {"adminState": "disable", "description": "old"}}));
    let client = RecordingClient::new().with_present(Status::Success, Some(observed));
    let reconciler = Reconciler::new(client, &schema);
    let mut record = port_record();

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    let ReconcileOutcome::Updated { delta } = outcome else {
        panic!("expected an update");
    };
    assert_eq!(delta.updates, vec![PathValue::new(path("port.adminState"), "enable")]);
    assert_eq!(canonical(&delta.deletes), vec!["port.description"]);

    let sets = reconciler.client().sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].envelope.action, Action::Update);
    assert!(sets[0].replace.is_empty());
    assert_eq!(sets[0].updates, delta.updates);
    assert_eq!(sets[0].deletes, delta.deletes);
}

#[tokio::test]
async fn test_up_to_date_resource_is_left_alone() {
    let schema = port_schema();
    let client = RecordingClient::new()
        .with_present(Status::Success, Some(tree(json!({"port": {"adminState": "enable"}}))));
    let reconciler = Reconciler::new(client, &schema);
    let mut record = port_record();

    assert_eq!(reconciler.reconcile(&mut record).await.unwrap(), ReconcileOutcome::UpToDate);
    assert!(reconciler.client().sets().is_empty());
    assert!(record.condition(ConditionKind::Ready).unwrap().is_true());
}

#[tokio::test]
async fn test_pending_status_waits() {
    let schema = port_schema();
    let client = RecordingClient::new().with_present(Status::Pending, None);
    let reconciler = Reconciler::new(client, &schema);
    let mut record = port_record();

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Waiting {
            observation: Observation::PresentUnknownStatus {
                status: Status::Pending
            }
        }
    );
    assert!(reconciler.client().sets().is_empty());
}

#[tokio::test]
async fn test_deletion_removes_root() {
    let schema = port_schema();
    let reconciler = Reconciler::new(RecordingClient::new(), &schema);
    let mut record = port_record();
    record.request_deletion();

    assert_eq!(reconciler.reconcile(&mut record).await.unwrap(), ReconcileOutcome::Deleted);
    let calls = reconciler.client().calls();
    assert_eq!(calls.len(), 1);
    let Call::Set(set) = &calls[0] else {
        panic!("expected a set, got {:?}", calls[0]);
    };
    assert_eq!(set.envelope.action, Action::Delete);
    assert_eq!(set.prefix, path("configure"));
    assert_eq!(set.deletes, vec![Path::new()]);
}

#[tokio::test]
async fn test_renamed_subinterface_is_deleted_first() {
    let schema = interface_schema();
    let reconciler = Reconciler::new(RecordingClient::new(), &schema);
    let mut record = record(
        "interface",
        "eth0",
        json!({"node": "leaf1", "name": "eth0", "subinterface": [{"index": 1}]}),
    )
    .with_index_map(index_map(&[("subinterface[index]", "0")]));

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::IndexRepaired {
            deleted: vec![path("subinterface[index=0]")]
        }
    );
    let sets = reconciler.client().sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].prefix, path("configure.interface[name=eth0]"));
    assert_eq!(canonical(&sets[0].deletes), vec!["subinterface[index=0]"]);
    assert_eq!(record.index_map(), index_map(&[("subinterface[index]", "1")]));

    // the next cycle proceeds to create, without the marker
    reconciler.client().clear_calls();
    assert_eq!(reconciler.reconcile(&mut record).await.unwrap(), ReconcileOutcome::Created);
    let sets = reconciler.client().sets();
    assert_eq!(sets.len(), 1);
    let paths: Vec<String> = sets[0].replace.iter().map(|pv| pv.path.to_canonical()).collect();
    assert_eq!(paths, vec!["name", "subinterface[index=1].index"]);
}

#[tokio::test]
async fn test_pending_resource_waits_before_index_repair() {
    let schema = interface_schema();
    let observed = tree(json!({"name": "eth0", "subinterface": [{"index": 0}]}));
    let client = RecordingClient::new().with_present(Status::Pending, Some(observed));
    let reconciler = Reconciler::new(client, &schema);
    let previous = index_map(&[("subinterface[index]", "0")]);
    let mut record = record(
        "interface",
        "eth0",
        json!({"node": "leaf1", "name": "eth0", "subinterface": [{"index": 1}]}),
    )
    .with_index_map(previous.clone());

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Waiting {
            observation: Observation::PresentUnknownStatus {
                status: Status::Pending
            }
        }
    );
    assert!(reconciler.client().sets().is_empty());
    assert_eq!(record.index_map(), previous);
    assert!(!record.condition(ConditionKind::Ready).unwrap().is_true());
}

#[tokio::test]
async fn test_present_without_data_waits_before_index_repair() {
    let schema = interface_schema();
    let client = RecordingClient::new().with_present(Status::Success, None);
    let reconciler = Reconciler::new(client, &schema);
    let previous = index_map(&[("subinterface[index]", "0")]);
    let mut record = record(
        "interface",
        "eth0",
        json!({"name": "eth0", "subinterface": [{"index": 1}]}),
    )
    .with_index_map(previous.clone());

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Waiting {
            observation: Observation::PresentNoData
        }
    );
    assert!(reconciler.client().sets().is_empty());
    assert_eq!(record.index_map(), previous);
}

#[tokio::test]
async fn test_unresolved_local_leafref_blocks_everything() {
    let schema = port_schema().with_local_leafrefs(vec![rule("sap.port", "port[port-id]")]);
    let reconciler = Reconciler::new(RecordingClient::new(), &schema);
    let mut record = record("port", "sap1", json!({"sap": {"port": "1/1/9"}}));

    let outcome = reconciler.reconcile(&mut record).await.unwrap();
    let ReconcileOutcome::LocalLeafRefBlocked { failures } = outcome else {
        panic!("expected a local leaf-ref block");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].remote_path, path("port[port-id=1/1/9]"));
    assert!(reconciler.client().calls().is_empty());

    let condition = record.condition(ConditionKind::LocalLeafRefValid).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert!(condition.message.contains("port[port-id=1/1/9]"));
    assert!(!record.condition(ConditionKind::Ready).unwrap().is_true());
}

#[tokio::test]
async fn test_external_leafref_checks_live_config() {
    let schema = port_schema().with_external_leafrefs(vec![rule("sap.port", "configure.port[port-id]")]);
    let desired = json!({"sap": {"port": "1/1/1"}});

    let missing = RecordingClient::new().with_config(tree(json!({"configure": {}})));
    let reconciler = Reconciler::new(missing, &schema);
    let mut blocked = record("port", "sap1", desired.clone());
    let outcome = reconciler.reconcile(&mut blocked).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::ExternalLeafRefBlocked { .. }));
    assert!(reconciler.client().calls().contains(&Call::GetConfig));
    assert!(reconciler.client().sets().is_empty());

    let present = RecordingClient::new()
        .with_config(tree(json!({"configure": {"port": [{"port-id": "1/1/1"}]}})));
    let reconciler = Reconciler::new(present, &schema);
    let mut allowed = record("port", "sap1", desired);
    assert_eq!(reconciler.reconcile(&mut allowed).await.unwrap(), ReconcileOutcome::Created);
    assert!(allowed.condition(ConditionKind::ExternalLeafRefValid).unwrap().is_true());
}

#[tokio::test]
async fn test_transport_failure_is_reported_on_record() {
    let schema = port_schema();
    let client = RecordingClient::new();
    client.fail_next_set("connection reset");
    let reconciler = Reconciler::new(client, &schema);
    let mut record = port_record();

    let err = reconciler.reconcile(&mut record).await.unwrap_err();
    assert!(err.is_retryable());
    let synced = record.condition(ConditionKind::Synced).unwrap();
    assert_eq!(synced.status, ConditionStatus::False);
    assert!(synced.message.contains("connection reset"));
}

#[tokio::test]
async fn test_condition_times_survive_repeated_state() {
    let schema = port_schema();
    let clock = Arc::new(FixedClock::new(1_000));
    let client = RecordingClient::new()
        .with_present(Status::Success, Some(tree(json!({"port": {"adminState": "enable"}}))));
    let reconciler = Reconciler::new(client, &schema).with_clock(clock.clone());
    let mut record = port_record();

    reconciler.reconcile(&mut record).await.unwrap();
    clock.advance(500);
    reconciler.reconcile(&mut record).await.unwrap();

    let ready = record.condition(ConditionKind::Ready).unwrap();
    assert_eq!(ready.last_transition_millis, 1_000);
}

#[tokio::test]
async fn test_create_fans_out_to_every_target() {
    let schema = port_schema();
    let a = Arc::new(RecordingClient::new());
    let b = Arc::new(RecordingClient::new());
    let targets = FanOut::new().with_target("a", a.clone()).with_target("b", b.clone());
    let reconciler = Reconciler::new(targets, &schema);
    let mut record = port_record();

    assert_eq!(reconciler.reconcile(&mut record).await.unwrap(), ReconcileOutcome::Created);
    assert_eq!(a.sets().len(), 1);
    assert_eq!(b.sets(), a.sets());
}

#[tokio::test]
async fn test_drifted_target_is_rewritten_everywhere() {
    let schema = port_schema();
    let desired = tree(json!({"port": {"adminState": "enable"}}));
    let drifted = tree(json!({"port": {"adminState": "disable"}}));
    let a = Arc::new(RecordingClient::new().with_present(Status::Success, Some(desired)));
    let b = Arc::new(RecordingClient::new().with_present(Status::Success, Some(drifted)));
    let targets = FanOut::new().with_target("a", a.clone()).with_target("b", b.clone());
    let reconciler = Reconciler::new(targets, &schema);
    let mut record = port_record();

    assert_eq!(reconciler.reconcile(&mut record).await.unwrap(), ReconcileOutcome::Created);
    let sets = b.sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].envelope.action, Action::Create);
    assert_eq!(
        sets[0].replace,
        vec![PathValue::new(path("port.adminState"), "enable")]
    );
    assert_eq!(a.sets(), sets);
}

#[tokio::test]
async fn test_fan_out_failure_names_target() {
    let schema = port_schema();
    let a = Arc::new(RecordingClient::new());
    let b = Arc::new(RecordingClient::new());
    b.fail_next_set("unreachable");
    let targets = FanOut::new().with_target("a", a.clone()).with_target("b", b.clone());
    let reconciler = Reconciler::new(targets, &schema);
    let mut record = port_record();

    let err = reconciler.reconcile(&mut record).await.unwrap_err();
    assert_eq!(err.failed_target(), Some("b"));
    assert!(matches!(err, ReconcileError::PartialMultiTarget { completed: 1, .. }));
    assert_eq!(a.sets().len(), 1);
}

#[tokio::test]
async fn test_registration_then_reconcile() {
    let a = Arc::new(RecordingClient::new());
    let registration = Registration::new(
        "srl",
        tree(json!({"subscriptions": ["interface"]})),
        FanOut::new().with_target("a", a.clone()),
    );

    let state = registration.ensure().await.unwrap();
    assert!(matches!(state, RegistrationState::Mismatch { found: None, .. }));
    let sets = a.sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].prefix, registration.path());
    let body = &sets[0].replace[0].value;
    assert_eq!(body.get("device-type"), Some(&ConfigTree::from("srl")));
    assert!(body.get("subscriptions").is_some());
}
