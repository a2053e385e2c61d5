//! The remote protocol client seam.
//!
//! The engine talks to a remote element only through [`RemoteClient`]:
//! a path-addressed get, a set carrying replaces, updates and deletes, and a
//! get of the element's full configuration. Wire encoding is left to the
//! implementation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::envelope::{Envelope, Status};
use super::errors::ReconcileError;
use crate::tree::{ConfigTree, Path, PathValue};

/// Response to a get: the tree found at the requested root and the
/// element's view of the resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub data: Option<ConfigTree>,
    pub envelope: Envelope,
}

/// One set transaction. Paths in `replace`, `updates` and `deletes` are
/// relative to `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRequest {
    pub prefix: Path,
    pub replace: Vec<PathValue>,
    pub updates: Vec<PathValue>,
    pub deletes: Vec<Path>,
    pub envelope: Envelope,
}

impl SetRequest {
    pub fn new(prefix: Path, envelope: Envelope) -> Self {
        Self {
            prefix,
            replace: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            envelope,
        }
    }

    pub fn with_replace(mut self, replace: Vec<PathValue>) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_updates(mut self, updates: Vec<PathValue>) -> Self {
        self.updates = updates;
        self
    }

    pub fn with_deletes(mut self, deletes: Vec<Path>) -> Self {
        self.deletes = deletes;
        self
    }
}

/// Client of a remote element.
///
/// Implementations map connection and protocol failures to
/// [`ReconcileError::Transport`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Reads the tree at `root`.
    async fn get(&self, root: &Path, envelope: &Envelope) -> Result<GetResponse, ReconcileError>;

    /// Applies one set transaction.
    async fn set(&self, request: SetRequest) -> Result<(), ReconcileError>;

    /// Reads the element's full configuration.
    async fn get_config(&self) -> Result<ConfigTree, ReconcileError>;
}

#[async_trait]
impl<T: RemoteClient + ?Sized> RemoteClient for Arc<T> {
    async fn get(&self, root: &Path, envelope: &Envelope) -> Result<GetResponse, ReconcileError> {
        (**self).get(root, envelope).await
    }

    async fn set(&self, request: SetRequest) -> Result<(), ReconcileError> {
        (**self).set(request).await
    }

    async fn get_config(&self) -> Result<ConfigTree, ReconcileError> {
        (**self).get_config().await
    }
}

/// A call received by a [`RecordingClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get { root: Path, envelope: Envelope },
    Set(SetRequest),
    GetConfig,
}

#[derive(Debug, Default)]
struct Script {
    observed: Option<ConfigTree>,
    cache_ready: bool,
    exists: bool,
    has_data: bool,
    status: Status,
    config: ConfigTree,
    get_failures: VecDeque<String>,
    set_failures: VecDeque<String>,
    calls: Vec<Call>,
}

/// An in-memory [`RemoteClient`] that answers from a script and records
/// every call.
///
/// Out of the box the element reports a ready cache and an absent resource.
#[derive(Debug)]
pub struct RecordingClient {
    script: Mutex<Script>,
}

impl Default for RecordingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                cache_ready: true,
                ..Script::default()
            }),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets whether the element's cache is ready.
    pub fn with_cache_ready(self, ready: bool) -> Self {
        self.script().cache_ready = ready;
        self
    }

    /// Reports the resource as absent, optionally with data at its root.
    pub fn with_absent(self, data: Option<ConfigTree>) -> Self {
        {
            let mut script = self.script();
            script.exists = false;
            script.has_data = data.is_some();
            script.observed = data;
        }
        self
    }

    /// Reports the resource as present with the given status and data.
    pub fn with_present(self, status: Status, data: Option<ConfigTree>) -> Self {
        {
            let mut script = self.script();
            script.exists = true;
            script.status = status;
            script.has_data = data.is_some();
            script.observed = data;
        }
        self
    }

    /// Sets the tree returned by [`RemoteClient::get_config`].
    pub fn with_config(self, config: ConfigTree) -> Self {
        self.script().config = config;
        self
    }

    /// Makes the next get fail with a transport error.
    pub fn fail_next_get(&self, reason: impl Into<String>) {
        self.script().get_failures.push_back(reason.into());
    }

    /// Makes the next set fail with a transport error.
    pub fn fail_next_set(&self, reason: impl Into<String>) {
        self.script().set_failures.push_back(reason.into());
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.script().calls.clone()
    }

    /// Returns the set requests received so far.
    pub fn sets(&self) -> Vec<SetRequest> {
        self.script()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Set(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.script().calls.clear();
    }
}

#[async_trait]
impl RemoteClient for RecordingClient {
    async fn get(&self, root: &Path, envelope: &Envelope) -> Result<GetResponse, ReconcileError> {
        let mut script = self.script();
        script.calls.push(Call::Get {
            root: root.clone(),
            envelope: envelope.clone(),
        });
        if let Some(reason) = script.get_failures.pop_front() {
            return Err(ReconcileError::transport(reason));
        }
        let envelope = envelope
            .clone()
            .with_cache_ready(script.cache_ready)
            .with_exists(script.exists)
            .with_has_data(script.has_data)
            .with_status(script.status);
        Ok(GetResponse {
            data: script.observed.clone(),
            envelope,
        })
    }

    async fn set(&self, request: SetRequest) -> Result<(), ReconcileError> {
        let mut script = self.script();
        script.calls.push(Call::Set(request));
        match script.set_failures.pop_front() {
            Some(reason) => Err(ReconcileError::transport(reason)),
            None => Ok(()),
        }
    }

    async fn get_config(&self) -> Result<ConfigTree, ReconcileError> {
        let mut script = self.script();
        script.calls.push(Call::GetConfig);
        Ok(script.config.clone())
    }
}
