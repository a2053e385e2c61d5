//! A remote client spanning several targets.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::client::{GetResponse, RemoteClient, SetRequest};
use super::envelope::Envelope;
use super::errors::ReconcileError;
use crate::tree::{ConfigTree, Path};

/// Sends every request to every target, in order.
///
/// The first failure aborts the remaining targets. The error names the
/// failing target and how many targets had already been written, since
/// those writes are not rolled back.
pub struct FanOut<C> {
    targets: Vec<(String, C)>,
}

impl<C> Default for FanOut<C> {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
        }
    }
}

impl<C: RemoteClient> FanOut<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target. Requests reach targets in the order they were added.
    pub fn with_target(mut self, name: impl Into<String>, client: C) -> Self {
        self.targets.push((name.into(), client));
        self
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn ensure_targets(&self) -> Result<(), ReconcileError> {
        if self.targets.is_empty() {
            return Err(ReconcileError::transport("no targets configured"));
        }
        Ok(())
    }

    /// Reads `root` from every target and returns each response.
    pub async fn get_all(
        &self,
        root: &Path,
        envelope: &Envelope,
    ) -> Result<Vec<(String, GetResponse)>, ReconcileError> {
        self.ensure_targets()?;
        let mut responses = Vec::with_capacity(self.targets.len());
        for (completed, (name, client)) in self.targets.iter().enumerate() {
            let response = client
                .get(root, envelope)
                .await
                .map_err(|err| partial(name, completed, err))?;
            responses.push((name.clone(), response));
        }
        Ok(responses)
    }
}

fn partial(target: &str, completed: usize, err: ReconcileError) -> ReconcileError {
    warn!(target_name = %target, completed, error = %err, "Request failed on target");
    ReconcileError::PartialMultiTarget {
        target: target.to_string(),
        completed,
        source: Box::new(err),
    }
}

#[async_trait]
impl<C: RemoteClient> RemoteClient for FanOut<C> {
    /// Combines the responses of all targets.
    ///
    /// The data is the first target's. Metadata flags hold only if they hold
    /// on every target. When any target's data differs from the first, the
    /// combined response is absent with no data, so the next cycle creates
    /// the resource on every target with replace semantics.
    async fn get(&self, root: &Path, envelope: &Envelope) -> Result<GetResponse, ReconcileError> {
        let mut responses = self.get_all(root, envelope).await?.into_iter();
        let Some((_, mut combined)) = responses.next() else {
            return Err(ReconcileError::transport("no targets configured"));
        };
        let mut diverged = false;
        for (name, response) in responses {
            let meta = &response.envelope;
            combined.envelope.cache_ready &= meta.cache_ready;
            combined.envelope.has_data &= meta.has_data;
            combined.envelope.exists &= meta.exists;
            combined.envelope.status = combined.envelope.status.worst(meta.status);
            if response.data != combined.data {
                debug!(target_name = %name, "Target data differs from first target");
                diverged = true;
            }
        }
        if diverged {
            combined.envelope.exists = false;
            combined.envelope.has_data = false;
            combined.data = None;
        }
        Ok(combined)
    }

    async fn set(&self, request: SetRequest) -> Result<(), ReconcileError> {
        self.ensure_targets()?;
        for (completed, (name, client)) in self.targets.iter().enumerate() {
            client
                .set(request.clone())
                .await
                .map_err(|err| partial(name, completed, err))?;
            debug!(target_name = %name, "Set applied");
        }
        Ok(())
    }

    /// Returns the first target's configuration.
    async fn get_config(&self) -> Result<ConfigTree, ReconcileError> {
        self.ensure_targets()?;
        let (name, client) = &self.targets[0];
        client.get_config().await.map_err(|err| partial(name, 0, err))
    }
}
