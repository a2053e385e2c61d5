use std::time::Duration;

use netconverge::config::{BackoffConfig, DEFAULT_SUBSCRIPTION, SubscriptionConfig};
use netconverge::subscription::{
    ChangeEvent, MemorySessionFactory, Notification, SubscriptionError, SubscriptionManager,
    TargetCommand, TargetConfig, TargetState,
};
use netconverge::tree::PathValue;
use tokio::sync::{mpsc, oneshot};

use crate::helpers::*;

fn quick_config() -> SubscriptionConfig {
    SubscriptionConfig {
        connect_timeout_ms: 500,
        backoff: BackoffConfig {
            base_ms: 1,
            max_ms: 5,
            max_attempts: 3,
        },
        ..SubscriptionConfig::default()
    }
}

fn start() -> (MemorySessionFactory, SubscriptionManager, mpsc::Receiver<ChangeEvent>) {
    let factory = MemorySessionFactory::new();
    let (manager, events) = SubscriptionManager::start(factory.clone(), &quick_config()).unwrap();
    (factory, manager, events)
}

async fn next_event(events: &mut mpsc::Receiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for a change event")
        .expect("event channel closed")
}

async fn wait_for_state(manager: &SubscriptionManager, target: &str, state: TargetState) -> bool {
    for _ in 0..400 {
        if manager.target_state(target).await == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

async fn wait_for_subscribes(factory: &MemorySessionFactory, target: &str, count: usize) -> bool {
    for _ in 0..400 {
        if factory.subscribe_count(target, DEFAULT_SUBSCRIPTION) >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn update(leaf: &str, value: &str) -> Notification {
    Notification::Update {
        updated: vec![PathValue::new(path(leaf), value)],
        deleted: vec![],
    }
}

#[tokio::test]
async fn test_notifications_become_change_events() {
    let (factory, manager, mut events) = start();
    manager.add_target(TargetConfig::new("leaf1", "10.0.0.1:57400")).await.unwrap();
    assert!(factory.wait_for_stream("leaf1", DEFAULT_SUBSCRIPTION).await);
    assert!(wait_for_state(&manager, "leaf1", TargetState::Subscribed).await);

    // sync responses are only logged
    assert!(factory.push("leaf1", DEFAULT_SUBSCRIPTION, Notification::SyncResponse));
    assert!(factory.push(
        "leaf1",
        DEFAULT_SUBSCRIPTION,
        Notification::Update {
            updated: vec![PathValue::new(path("interface[name=eth0].admin-state"), "enable")],
            deleted: vec![path("interface[name=eth1]")],
        }
    ));

    let event = next_event(&mut events).await;
    assert_eq!(event.target, "leaf1");
    assert_eq!(event.subscription, DEFAULT_SUBSCRIPTION);
    assert_eq!(event.updated.len(), 1);
    assert_eq!(canonical(&event.deleted), vec!["interface[name=eth1]"]);
}

#[tokio::test]
async fn test_named_subscriptions_start_and_stop() {
    let (factory, manager, mut events) = start();
    manager.add_target(TargetConfig::new("leaf1", "a")).await.unwrap();

    manager
        .start_subscription("leaf1", "stats", vec![path("interface[name].statistics")])
        .await
        .unwrap();
    assert_eq!(manager.subscriptions("leaf1").await, vec![DEFAULT_SUBSCRIPTION, "stats"]);
    assert!(factory.wait_for_stream("leaf1", "stats").await);

    assert!(factory.push("leaf1", "stats", update("interface[name=eth0].statistics.in", "7")));
    assert_eq!(next_event(&mut events).await.subscription, "stats");

    let err = manager
        .start_subscription("leaf1", "stats", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriptionError::SubscriptionExists { .. }));

    manager.stop_subscription("leaf1", "stats").await.unwrap();
    assert!(!manager.has_subscription("leaf1", "stats").await);
    assert!(!factory.has_stream("leaf1", "stats"));
    assert!(manager.has_subscription("leaf1", DEFAULT_SUBSCRIPTION).await);

    let err = manager.stop_subscription("leaf1", "stats").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_starts_of_one_subscription() {
    let (_factory, manager, _events) = start();
    manager.add_target(TargetConfig::new("leaf1", "a")).await.unwrap();

    let (first, second) = tokio::join!(
        manager.start_subscription("leaf1", "stats", vec![path("interface[name].statistics")]),
        manager.start_subscription("leaf1", "stats", vec![path("interface[name].statistics")]),
    );
    assert_eq!(first.is_ok() as usize + second.is_ok() as usize, 1);
    let err = first.err().or(second.err()).unwrap();
    assert!(matches!(err, SubscriptionError::SubscriptionExists { .. }));
    assert_eq!(manager.subscriptions("leaf1").await, vec![DEFAULT_SUBSCRIPTION, "stats"]);

    manager.stop_subscription("leaf1", "stats").await.unwrap();
    assert_eq!(manager.subscriptions("leaf1").await, vec![DEFAULT_SUBSCRIPTION]);
}

#[tokio::test]
async fn test_subscriptions_need_a_live_target() {
    let (_factory, manager, _events) = start();
    let err = manager
        .start_subscription("ghost", "stats", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriptionError::TargetNotFound(_)));
    assert!(!manager.has_subscription("ghost", DEFAULT_SUBSCRIPTION).await);
}

#[tokio::test]
async fn test_delete_stops_every_stream() {
    let (factory, manager, _events) = start();
    manager.add_target(TargetConfig::new("leaf1", "a")).await.unwrap();
    manager.start_subscription("leaf1", "stats", vec![]).await.unwrap();
    assert!(factory.wait_for_stream("leaf1", DEFAULT_SUBSCRIPTION).await);
    assert!(factory.wait_for_stream("leaf1", "stats").await);

    manager.delete_target("leaf1").await.unwrap();
    assert_eq!(manager.target_state("leaf1").await, TargetState::Absent);
    assert!(manager.targets().await.is_empty());
    assert!(!factory.has_stream("leaf1", DEFAULT_SUBSCRIPTION));
    assert!(!factory.has_stream("leaf1", "stats"));
}

#[tokio::test]
async fn test_broken_stream_reconnects() {
    let (factory, manager, mut events) = start();
    manager.add_target(TargetConfig::new("leaf1", "a")).await.unwrap();
    assert!(factory.wait_for_stream("leaf1", DEFAULT_SUBSCRIPTION).await);

    assert!(factory.break_stream("leaf1", DEFAULT_SUBSCRIPTION, "connection reset"));
    assert!(wait_for_subscribes(&factory, "leaf1", 2).await);
    assert!(factory.wait_for_stream("leaf1", DEFAULT_SUBSCRIPTION).await);
    assert!(wait_for_state(&manager, "leaf1", TargetState::Subscribed).await);
    assert_eq!(factory.connect_count("leaf1"), 2);

    assert!(factory.push("leaf1", DEFAULT_SUBSCRIPTION, update("system.name", "leaf1")));
    assert_eq!(next_event(&mut events).await.target, "leaf1");
}

#[tokio::test]
async fn test_exhausted_reconnects_remove_target() {
    let (factory, manager, _events) = start();
    manager.add_target(TargetConfig::new("leaf1", "a")).await.unwrap();
    assert!(factory.wait_for_stream("leaf1", DEFAULT_SUBSCRIPTION).await);

    factory.refuse("leaf1");
    assert!(factory.break_stream("leaf1", DEFAULT_SUBSCRIPTION, "connection reset"));
    assert!(wait_for_state(&manager, "leaf1", TargetState::Absent).await);
    // one initial connect plus three failed attempts
    assert_eq!(factory.connect_count("leaf1"), 4);

    // the external layer adds it again once it is reachable
    factory.accept("leaf1");
    manager.add_target(TargetConfig::new("leaf1", "a")).await.unwrap();
    assert!(manager.has_subscription("leaf1", DEFAULT_SUBSCRIPTION).await);
}

#[tokio::test]
async fn test_raw_commands_are_processed_in_order() {
    let (factory, manager, _events) = start();
    let commands = manager.command_sender();

    let (add_tx, add_rx) = oneshot::channel();
    let (delete_tx, delete_rx) = oneshot::channel();
    commands
        .send(TargetCommand::Add {
            config: TargetConfig::new("leaf1", "a"),
            response: add_tx,
        })
        .await
        .unwrap();
    commands
        .send(TargetCommand::Delete {
            name: "leaf1".to_string(),
            response: delete_tx,
        })
        .await
        .unwrap();

    add_rx.await.unwrap().unwrap();
    delete_rx.await.unwrap().unwrap();
    assert_eq!(factory.connect_count("leaf1"), 1);
    assert_eq!(manager.target_state("leaf1").await, TargetState::Absent);
}

#[tokio::test]
async fn test_shutdown_removes_all_targets() {
    let (_factory, manager, _events) = start();
    for name in ["leaf1", "leaf2", "spine1"] {
        manager.add_target(TargetConfig::new(name, "a")).await.unwrap();
    }
    assert_eq!(manager.targets().await, vec!["leaf1", "leaf2", "spine1"]);

    manager.shutdown().await.unwrap();
    assert!(manager.targets().await.is_empty());
}
