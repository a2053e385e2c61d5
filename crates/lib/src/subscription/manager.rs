//! The target map, its dispatcher task and the stream tasks.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::backoff::Backoff;
use super::error::SubscriptionError;
use super::session::{Notification, NotificationStream, Session, SessionFactory};
use super::target::{TargetConfig, TargetState};
use crate::config::SubscriptionConfig;
use crate::tree::{Path, PathValue};

/// A change reported by a target, handed to whoever re-reconciles.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub target: String,
    pub subscription: String,
    pub updated: Vec<PathValue>,
    pub deleted: Vec<Path>,
}

/// Commands consumed by the dispatcher task, in order.
pub enum TargetCommand {
    /// Connect to a target and open its default subscription.
    Add {
        config: TargetConfig,
        response: oneshot::Sender<Result<(), SubscriptionError>>,
    },
    /// Stop every stream of a target and forget it.
    Delete {
        name: String,
        response: oneshot::Sender<Result<(), SubscriptionError>>,
    },
}

impl std::fmt::Debug for TargetCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add { config, .. } => f.debug_struct("Add").field("config", config).finish(),
            Self::Delete { name, .. } => f.debug_struct("Delete").field("name", name).finish(),
        }
    }
}

struct StreamHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct TargetEntry {
    config: TargetConfig,
    /// Distinguishes this entry from a later one with the same name.
    generation: u64,
    state: TargetState,
    session: Option<Arc<dyn Session>>,
    cancel: watch::Sender<bool>,
    streams: HashMap<String, StreamHandle>,
}

/// State shared by the handle, the dispatcher and the stream tasks.
#[derive(Clone)]
struct Shared {
    /// Starting or stopping a subscription takes the write lock, since it
    /// changes the entry's `streams`.
    targets: Arc<RwLock<HashMap<String, TargetEntry>>>,
    factory: Arc<dyn SessionFactory>,
    events: mpsc::Sender<ChangeEvent>,
    connect_timeout: Duration,
    backoff: Backoff,
}

impl Shared {
    async fn connect(&self, config: &TargetConfig) -> Result<Arc<dyn Session>, SubscriptionError> {
        let timeout = config.connect_timeout(self.connect_timeout);
        match tokio::time::timeout(timeout, self.factory.connect(config)).await {
            Ok(Ok(session)) => Ok(Arc::from(session)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SubscriptionError::ConnectTimeout {
                target: config.name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Spawns the task owning subscription `name` on a connected entry.
    fn spawn_stream(
        &self,
        entry: &mut TargetEntry,
        name: String,
        paths: Vec<Path>,
    ) -> Result<(), SubscriptionError> {
        let target = entry.config.name.clone();
        let Some(session) = entry.session.clone() else {
            return Err(SubscriptionError::TargetNotFound(target));
        };
        if entry.streams.contains_key(&name) {
            return Err(SubscriptionError::SubscriptionExists { target, name });
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = StreamTask {
            shared: self.clone(),
            config: entry.config.clone(),
            generation: entry.generation,
            name: name.clone(),
            paths,
            session,
            signals: Signals {
                stop: stop_rx,
                cancel: entry.cancel.subscribe(),
            },
        };
        let span = info_span!("subscription", target_name = %target, name = %name);
        let handle = tokio::spawn(task.run().instrument(span));
        entry.streams.insert(
            name,
            StreamHandle {
                stop: stop_tx,
                task: handle,
            },
        );
        Ok(())
    }

    async fn set_state(&self, target: &str, generation: u64, state: TargetState) {
        let mut targets = self.targets.write().await;
        if let Some(entry) = targets.get_mut(target) {
            if entry.generation == generation && entry.state != TargetState::Draining {
                entry.state = state;
            }
        }
    }

    async fn set_session(&self, target: &str, generation: u64, session: Arc<dyn Session>) {
        let mut targets = self.targets.write().await;
        if let Some(entry) = targets.get_mut(target) {
            if entry.generation == generation {
                entry.session = Some(session);
            }
        }
    }

    /// Stops every stream of `name`, waits for them and removes the entry.
    async fn drain(&self, name: &str) -> Result<(), SubscriptionError> {
        let (generation, tasks) = {
            let mut targets = self.targets.write().await;
            let Some(entry) = targets.get_mut(name) else {
                return Err(SubscriptionError::TargetNotFound(name.to_string()));
            };
            entry.state = TargetState::Draining;
            let _ = entry.cancel.send(true);
            let tasks: Vec<_> = entry
                .streams
                .drain()
                .map(|(subscription, handle)| {
                    let _ = handle.stop.send(());
                    (subscription, handle.task)
                })
                .collect();
            (entry.generation, tasks)
        };

        for (subscription, task) in tasks {
            if let Err(e) = task.await {
                warn!(target_name = %name, subscription = %subscription, error = %e, "Stream task failed");
            }
        }

        let mut targets = self.targets.write().await;
        if targets.get(name).is_some_and(|entry| entry.generation == generation) {
            targets.remove(name);
        }
        info!(target_name = %name, "Target removed");
        Ok(())
    }

    /// Drops a target whose stream could not be restored.
    async fn remove_exhausted(&self, target: &str, generation: u64) {
        let mut targets = self.targets.write().await;
        if !targets.get(target).is_some_and(|entry| entry.generation == generation) {
            return;
        }
        if let Some(entry) = targets.remove(target) {
            let _ = entry.cancel.send(true);
            for (_, handle) in entry.streams {
                let _ = handle.stop.send(());
            }
        }
    }
}

/// Stop signals a stream task listens to while it waits on anything else.
struct Signals {
    stop: oneshot::Receiver<()>,
    cancel: watch::Receiver<bool>,
}

impl Signals {
    /// Runs `fut` unless a stop or a cancellation arrives first.
    async fn guard<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::select! {
            _ = &mut self.stop => None,
            _ = self.cancel.changed() => None,
            output = fut => Some(output),
        }
    }
}

enum StreamEnd {
    Stopped,
    Broken { reason: String, subscribed: bool },
}

struct StreamTask {
    shared: Shared,
    config: TargetConfig,
    generation: u64,
    name: String,
    paths: Vec<Path>,
    session: Arc<dyn Session>,
    signals: Signals,
}

impl StreamTask {
    async fn run(mut self) {
        info!(paths = self.paths.len(), "Subscription started");
        let mut attempt = 0u32;
        loop {
            match self.stream_once().await {
                StreamEnd::Stopped => {
                    info!("Subscription stopped");
                    return;
                }
                StreamEnd::Broken { reason, subscribed } => {
                    if subscribed {
                        attempt = 0;
                    }
                    warn!(reason = %reason, "Stream broken, reconnecting");
                }
            }
            if !self.reconnect(&mut attempt).await {
                return;
            }
        }
    }

    /// Opens the stream and forwards notifications until it ends.
    async fn stream_once(&mut self) -> StreamEnd {
        let opened = self
            .signals
            .guard(self.session.subscribe(&self.name, &self.paths))
            .await;
        let mut stream: Box<dyn NotificationStream> = match opened {
            None => return StreamEnd::Stopped,
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                return StreamEnd::Broken {
                    reason: e.to_string(),
                    subscribed: false,
                };
            }
        };
        self.shared
            .set_state(&self.config.name, self.generation, TargetState::Subscribed)
            .await;
        debug!("Stream open");

        loop {
            match self.signals.guard(stream.next()).await {
                None => return StreamEnd::Stopped,
                Some(Some(Ok(Notification::Update { updated, deleted }))) => {
                    if !self.forward(updated, deleted).await {
                        return StreamEnd::Stopped;
                    }
                }
                Some(Some(Ok(Notification::SyncResponse))) => {
                    debug!("Sync response received");
                }
                Some(Some(Err(e))) => {
                    return StreamEnd::Broken {
                        reason: e.to_string(),
                        subscribed: true,
                    };
                }
                Some(None) => {
                    return StreamEnd::Broken {
                        reason: "stream ended".to_string(),
                        subscribed: true,
                    };
                }
            }
        }
    }

    /// Returns `false` if the task was stopped while the event was queued.
    async fn forward(&mut self, updated: Vec<PathValue>, deleted: Vec<Path>) -> bool {
        for update in &updated {
            debug!(path = %update.path, value = %update.value, "Update received");
        }
        for path in &deleted {
            debug!(path = %path, "Delete received");
        }
        let event = ChangeEvent {
            target: self.config.name.clone(),
            subscription: self.name.clone(),
            updated,
            deleted,
        };
        match self.signals.guard(self.shared.events.send(event)).await {
            None => false,
            Some(Ok(())) => true,
            Some(Err(_)) => {
                debug!("Change event receiver dropped");
                true
            }
        }
    }

    /// Restores the session with backoff. Returns `false` if the task
    /// should end, either stopped or out of attempts.
    async fn reconnect(&mut self, attempt: &mut u32) -> bool {
        let target = self.config.name.clone();
        loop {
            *attempt += 1;
            if self.shared.backoff.exhausted(*attempt) {
                error!(
                    target_name = %target,
                    "Giving up on target after {} attempts",
                    self.shared.backoff.max_attempts()
                );
                self.shared.remove_exhausted(&target, self.generation).await;
                return false;
            }
            self.shared
                .set_state(&target, self.generation, TargetState::Connecting)
                .await;

            let delay = self.shared.backoff.delay(*attempt);
            debug!(attempt = *attempt, delay_ms = delay.as_millis() as u64, "Waiting to reconnect");
            if self.signals.guard(tokio::time::sleep(delay)).await.is_none() {
                info!("Subscription stopped");
                return false;
            }

            match self.signals.guard(self.shared.connect(&self.config)).await {
                None => {
                    info!("Subscription stopped");
                    return false;
                }
                Some(Ok(session)) => {
                    self.shared
                        .set_session(&target, self.generation, session.clone())
                        .await;
                    self.session = session;
                    info!(attempt = *attempt, "Reconnected");
                    return true;
                }
                Some(Err(e)) => {
                    warn!(attempt = *attempt, error = %e, "Reconnect failed");
                }
            }
        }
    }
}

/// Consumes [`TargetCommand`]s one at a time.
struct Dispatcher {
    command_rx: mpsc::Receiver<TargetCommand>,
    shared: Shared,
    default_name: String,
    default_paths: Vec<Path>,
    next_generation: u64,
}

impl Dispatcher {
    async fn run(mut self) {
        async move {
            info!("Starting subscription manager");
            while let Some(command) = self.command_rx.recv().await {
                self.handle_command(command).await;
            }

            info!("Subscription manager shutting down");
            let names: Vec<String> = self.shared.targets.read().await.keys().cloned().collect();
            for name in names {
                if let Err(e) = self.shared.drain(&name).await {
                    debug!(target_name = %name, error = %e, "Target already gone");
                }
            }
        }
        .instrument(info_span!("subscription_manager"))
        .await
    }

    async fn handle_command(&mut self, command: TargetCommand) {
        match command {
            TargetCommand::Add { config, response } => {
                let result = self.add_target(config).await;
                let _ = response.send(result);
            }
            TargetCommand::Delete { name, response } => {
                let result = self.shared.drain(&name).await;
                if let Err(e) = &result {
                    debug!(target_name = %name, error = %e, "Delete of unknown target");
                }
                let _ = response.send(result);
            }
        }
    }

    async fn add_target(&mut self, config: TargetConfig) -> Result<(), SubscriptionError> {
        let name = config.name.clone();
        let generation = self.next_generation;
        self.next_generation += 1;
        {
            let mut targets = self.shared.targets.write().await;
            if targets.contains_key(&name) {
                debug!(target_name = %name, "Target already known");
                return Ok(());
            }
            let (cancel, _) = watch::channel(false);
            targets.insert(
                name.clone(),
                TargetEntry {
                    config: config.clone(),
                    generation,
                    state: TargetState::Connecting,
                    session: None,
                    cancel,
                    streams: HashMap::new(),
                },
            );
        }

        let session = match self.shared.connect(&config).await {
            Ok(session) => session,
            Err(e) => {
                warn!(target_name = %name, address = %config.address, error = %e, "Failed to connect to target");
                self.shared.targets.write().await.remove(&name);
                return Err(e);
            }
        };

        let mut targets = self.shared.targets.write().await;
        let Some(entry) = targets.get_mut(&name) else {
            return Err(SubscriptionError::TargetNotFound(name));
        };
        entry.session = Some(session);
        self.shared
            .spawn_stream(entry, self.default_name.clone(), self.default_paths.clone())?;
        info!(target_name = %name, address = %config.address, "Target added");
        Ok(())
    }
}

/// Handle to the subscription manager.
///
/// Targets are added and removed through the dispatcher task, in the order
/// the commands were sent. Extra named subscriptions can be opened on a
/// live target directly. Change notifications from every stream arrive on
/// the receiver returned by [`start`](Self::start).
#[derive(Clone)]
pub struct SubscriptionManager {
    command_tx: mpsc::Sender<TargetCommand>,
    shared: Shared,
}

impl SubscriptionManager {
    /// Spawns the dispatcher and returns the handle with the event receiver.
    pub fn start(
        factory: impl SessionFactory + 'static,
        config: &SubscriptionConfig,
    ) -> Result<(Self, mpsc::Receiver<ChangeEvent>), SubscriptionError> {
        let root = Path::from_str(&config.root_path)?;
        let buffer = config.receive_buffer.max(1);
        let (command_tx, command_rx) = mpsc::channel(buffer);
        let (events_tx, events_rx) = mpsc::channel(buffer);

        let shared = Shared {
            targets: Arc::new(RwLock::new(HashMap::new())),
            factory: Arc::new(factory),
            events: events_tx,
            connect_timeout: config.connect_timeout(),
            backoff: Backoff::from_config(&config.backoff),
        };
        let dispatcher = Dispatcher {
            command_rx,
            shared: shared.clone(),
            default_name: config.name.clone(),
            default_paths: vec![root],
            next_generation: 0,
        };
        tokio::spawn(dispatcher.run());

        Ok((Self { command_tx, shared }, events_rx))
    }

    /// A sender for issuing commands without waiting on them.
    pub fn command_sender(&self) -> mpsc::Sender<TargetCommand> {
        self.command_tx.clone()
    }

    async fn send(
        &self,
        command: TargetCommand,
        response: oneshot::Receiver<Result<(), SubscriptionError>>,
    ) -> Result<(), SubscriptionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| SubscriptionError::CommandSendError(e.to_string()))?;
        response
            .await
            .map_err(|e| SubscriptionError::CommandSendError(e.to_string()))?
    }

    /// Connects to a target and opens its default subscription.
    ///
    /// Adding a target that is already known succeeds without doing anything.
    pub async fn add_target(&self, config: TargetConfig) -> Result<(), SubscriptionError> {
        let (tx, rx) = oneshot::channel();
        self.send(TargetCommand::Add { config, response: tx }, rx)
            .await
    }

    /// Stops every stream of a target and removes it.
    pub async fn delete_target(&self, name: &str) -> Result<(), SubscriptionError> {
        let (tx, rx) = oneshot::channel();
        self.send(
            TargetCommand::Delete {
                name: name.to_string(),
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Opens another named subscription on a live target.
    pub async fn start_subscription(
        &self,
        target: &str,
        name: &str,
        paths: Vec<Path>,
    ) -> Result<(), SubscriptionError> {
        let mut targets = self.shared.targets.write().await;
        let entry = match targets.get_mut(target) {
            Some(entry) if entry.state != TargetState::Draining => entry,
            _ => return Err(SubscriptionError::TargetNotFound(target.to_string())),
        };
        self.shared.spawn_stream(entry, name.to_string(), paths)?;
        info!(target_name = %target, subscription = %name, "Subscription added");
        Ok(())
    }

    /// Stops a named subscription and waits for its task to end.
    pub async fn stop_subscription(&self, target: &str, name: &str) -> Result<(), SubscriptionError> {
        let handle = {
            let mut targets = self.shared.targets.write().await;
            let Some(entry) = targets.get_mut(target) else {
                return Err(SubscriptionError::TargetNotFound(target.to_string()));
            };
            entry
                .streams
                .remove(name)
                .ok_or_else(|| SubscriptionError::SubscriptionNotFound {
                    target: target.to_string(),
                    name: name.to_string(),
                })?
        };
        let _ = handle.stop.send(());
        if let Err(e) = handle.task.await {
            warn!(target_name = %target, subscription = %name, error = %e, "Stream task failed");
        }
        Ok(())
    }

    pub async fn has_subscription(&self, target: &str, name: &str) -> bool {
        self.shared
            .targets
            .read()
            .await
            .get(target)
            .is_some_and(|entry| entry.streams.contains_key(name))
    }

    /// Names of the subscriptions open on `target`, sorted.
    pub async fn subscriptions(&self, target: &str) -> Vec<String> {
        let targets = self.shared.targets.read().await;
        let mut names: Vec<String> = targets
            .get(target)
            .map(|entry| entry.streams.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub async fn target_state(&self, target: &str) -> TargetState {
        self.shared
            .targets
            .read()
            .await
            .get(target)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Names of all known targets, sorted.
    pub async fn targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.targets.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deletes every target through the dispatcher.
    pub async fn shutdown(&self) -> Result<(), SubscriptionError> {
        for name in self.targets().await {
            match self.delete_target(&name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
