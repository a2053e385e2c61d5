//! The session seam between the manager and a telemetry protocol.
//!
//! A [`SessionFactory`] opens a [`Session`] to a target; a session opens
//! named [`NotificationStream`]s on sets of paths. The manager only ever
//! talks to these traits, so the protocol client lives outside the crate.

use async_trait::async_trait;

use super::error::SubscriptionError;
use super::target::TargetConfig;
use crate::tree::{Path, PathValue};

/// One message read from a subscription stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Paths that changed on the target.
    Update {
        updated: Vec<PathValue>,
        deleted: Vec<Path>,
    },
    /// The target finished sending its initial state.
    SyncResponse,
}

/// An open stream of notifications.
#[async_trait]
pub trait NotificationStream: Send {
    /// Waits for the next notification. `None` means the stream ended.
    async fn next(&mut self) -> Option<Result<Notification, SubscriptionError>>;
}

/// A connection to one target.
#[async_trait]
pub trait Session: Send + Sync {
    /// Opens the subscription `name` on `paths`.
    async fn subscribe(
        &self,
        name: &str,
        paths: &[Path],
    ) -> Result<Box<dyn NotificationStream>, SubscriptionError>;
}

/// Opens sessions to targets.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self, target: &TargetConfig) -> Result<Box<dyn Session>, SubscriptionError>;
}

#[cfg(any(test, feature = "testing"))]
pub use memory::MemorySessionFactory;

#[cfg(any(test, feature = "testing"))]
mod memory {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Notification, NotificationStream, Session, SessionFactory};
    use crate::subscription::error::SubscriptionError;
    use crate::subscription::target::TargetConfig;
    use crate::tree::Path;

    type Feed = mpsc::UnboundedSender<Result<Notification, SubscriptionError>>;

    #[derive(Default)]
    struct Network {
        refused: HashSet<String>,
        stalled: HashSet<String>,
        connects: HashMap<String, usize>,
        feeds: HashMap<(String, String), Feed>,
        subscriptions: HashMap<(String, String), usize>,
    }

    /// An in-process [`SessionFactory`] whose streams are fed by the test.
    ///
    /// Every subscription gets a channel; [`push`](Self::push) and
    /// [`break_stream`](Self::break_stream) write to the live one.
    #[derive(Clone, Default)]
    pub struct MemorySessionFactory {
        network: Arc<Mutex<Network>>,
    }

    impl MemorySessionFactory {
        pub fn new() -> Self {
            Self::default()
        }

        fn network(&self) -> MutexGuard<'_, Network> {
            self.network.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Makes connects to `target` fail until [`accept`](Self::accept).
        pub fn refuse(&self, target: &str) {
            self.network().refused.insert(target.to_string());
        }

        pub fn accept(&self, target: &str) {
            let mut network = self.network();
            network.refused.remove(target);
            network.stalled.remove(target);
        }

        /// Makes connects to `target` never complete.
        pub fn stall(&self, target: &str) {
            self.network().stalled.insert(target.to_string());
        }

        /// Number of connects attempted to `target`, failed ones included.
        pub fn connect_count(&self, target: &str) -> usize {
            self.network().connects.get(target).copied().unwrap_or(0)
        }

        /// Number of times `name` was opened on `target`.
        pub fn subscribe_count(&self, target: &str, name: &str) -> usize {
            self.network()
                .subscriptions
                .get(&(target.to_string(), name.to_string()))
                .copied()
                .unwrap_or(0)
        }

        /// Returns `true` while a reader holds the stream open.
        pub fn has_stream(&self, target: &str, name: &str) -> bool {
            self.network()
                .feeds
                .get(&(target.to_string(), name.to_string()))
                .is_some_and(|feed| !feed.is_closed())
        }

        /// Waits up to two seconds for the stream to be opened.
        pub async fn wait_for_stream(&self, target: &str, name: &str) -> bool {
            for _ in 0..400 {
                if self.has_stream(target, name) {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            false
        }

        /// Delivers a notification on the live stream.
        pub fn push(&self, target: &str, name: &str, notification: Notification) -> bool {
            self.send(target, name, Ok(notification))
        }

        /// Fails the live stream with a terminal error.
        pub fn break_stream(&self, target: &str, name: &str, reason: &str) -> bool {
            let err = SubscriptionError::Stream {
                target: target.to_string(),
                name: name.to_string(),
                reason: reason.to_string(),
            };
            self.send(target, name, Err(err))
        }

        fn send(
            &self,
            target: &str,
            name: &str,
            item: Result<Notification, SubscriptionError>,
        ) -> bool {
            let network = self.network();
            match network.feeds.get(&(target.to_string(), name.to_string())) {
                Some(feed) => feed.send(item).is_ok(),
                None => false,
            }
        }
    }

    #[async_trait]
    impl SessionFactory for MemorySessionFactory {
        async fn connect(
            &self,
            target: &TargetConfig,
        ) -> Result<Box<dyn Session>, SubscriptionError> {
            let stalled = {
                let mut network = self.network();
                *network.connects.entry(target.name.clone()).or_default() += 1;
                if network.refused.contains(&target.name) {
                    return Err(SubscriptionError::ConnectionFailed {
                        target: target.name.clone(),
                        reason: "connection refused".to_string(),
                    });
                }
                network.stalled.contains(&target.name)
            };
            if stalled {
                std::future::pending::<()>().await;
            }
            Ok(Box::new(MemorySession {
                target: target.name.clone(),
                network: self.network.clone(),
            }))
        }
    }

    struct MemorySession {
        target: String,
        network: Arc<Mutex<Network>>,
    }

    #[async_trait]
    impl Session for MemorySession {
        async fn subscribe(
            &self,
            name: &str,
            _paths: &[Path],
        ) -> Result<Box<dyn NotificationStream>, SubscriptionError> {
            let mut network = self.network.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if network.refused.contains(&self.target) {
                return Err(SubscriptionError::Stream {
                    target: self.target.clone(),
                    name: name.to_string(),
                    reason: "session closed".to_string(),
                });
            }
            let key = (self.target.clone(), name.to_string());
            let (tx, rx) = mpsc::unbounded_channel();
            network.feeds.insert(key.clone(), tx);
            *network.subscriptions.entry(key).or_default() += 1;
            Ok(Box::new(MemoryStream { rx }))
        }
    }

    struct MemoryStream {
        rx: mpsc::UnboundedReceiver<Result<Notification, SubscriptionError>>,
    }

    #[async_trait]
    impl NotificationStream for MemoryStream {
        async fn next(&mut self) -> Option<Result<Notification, SubscriptionError>> {
            self.rx.recv().await
        }
    }
}
