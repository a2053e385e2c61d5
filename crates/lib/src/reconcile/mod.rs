//! The per-resource reconcile state machine.
//!
//! Each cycle starts from scratch: the remote element is asked for the
//! resource's current tree and metadata, the result is classified as an
//! [`Observation`], and the [`Reconciler`] decides whether to create,
//! update, delete or wait. Nothing is remembered between cycles except the
//! index map persisted on the desired-state record.
//!
//! ```
//! use netconverge::reconcile::{MemoryStore, Reconciler, ReconcileOutcome, RecordingClient, ResourceIdentity};
//! use netconverge::schema::ResourceSchema;
//! use netconverge::tree::{ConfigTree, Path};
//! use std::str::FromStr;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), netconverge::Error> {
//! let schema = ResourceSchema::new("port", Path::from_str("configure")?);
//! let reconciler = Reconciler::new(RecordingClient::new(), &schema);
//! let mut record = MemoryStore::new(
//!     ResourceIdentity::new("port", "p1"),
//!     ConfigTree::from(serde_json::json!({"port": {"adminState": "enable"}})),
//! );
//! let outcome = reconciler.reconcile(&mut record).await?;
//! assert_eq!(outcome, ReconcileOutcome::Created);
//! # Ok(())
//! # }
//! ```

mod client;
mod conditions;
mod envelope;
mod errors;
mod fanout;
mod registration;
mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, info_span, warn};

pub use client::{Call, GetResponse, RecordingClient, RemoteClient, SetRequest};
pub use conditions::{Condition, ConditionKind, ConditionStatus, merge_conditions};
pub use envelope::{Action, Envelope, Status};
pub use errors::ReconcileError;
pub use fanout::FanOut;
pub use registration::{REGISTER_ELEM, REGISTER_KEY, Registration, RegistrationState};
pub use store::{DesiredState, MemoryStore, ResourceIdentity};

use crate::clock::{Clock, SystemClock};
use crate::delta::{Delta, diff};
use crate::flatten::{Flattener, normalize_entry_lists, strip_markers};
use crate::index::IndexTracker;
use crate::leafref::{ResolvedRef, ValidationMode, validate};
use crate::schema::ResourceSchema;
use crate::tree::{ConfigTree, Path};
use conditions::ConditionSet;

/// What the remote element reports about a resource, classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    /// The element's cache is not ready; nothing can be decided.
    NotReady,
    /// The resource does not exist and there is no data at its root.
    AbsentNoData,
    /// The resource does not exist but data is present at its root. An
    /// empty delta means the data can be adopted as is.
    AbsentWithData { delta: Delta },
    /// The resource exists and matches the desired tree.
    PresentUpToDate,
    /// The resource exists and differs from the desired tree.
    PresentStale { delta: Delta },
    /// The resource exists but the element returned no data for it.
    PresentNoData,
    /// The resource exists but its last change has not succeeded.
    PresentUnknownStatus { status: Status },
}

impl Observation {
    /// Returns `true` if no action is needed to match the desired tree.
    pub fn is_up_to_date(&self) -> bool {
        match self {
            Observation::PresentUpToDate => true,
            Observation::AbsentWithData { delta } => delta.is_empty(),
            _ => false,
        }
    }
}

/// What a call to [`Reconciler::reconcile`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// The resource was deleted from the element.
    Deleted,
    /// Local leaf references do not resolve; nothing was sent.
    LocalLeafRefBlocked { failures: Vec<ResolvedRef> },
    /// The element's cache is not ready.
    NotReady,
    /// Entries left behind by renamed keys were deleted. The next cycle
    /// continues from the repaired state.
    IndexRepaired { deleted: Vec<Path> },
    /// Leaf references into the element's configuration do not resolve.
    ExternalLeafRefBlocked { failures: Vec<ResolvedRef> },
    /// The resource was created.
    Created,
    /// The delta was applied.
    Updated { delta: Delta },
    /// Nothing to do.
    UpToDate,
    /// The element is in a state the reconciler does not act on.
    Waiting { observation: Observation },
}

/// Drives resources of one schema towards their desired state.
pub struct Reconciler<'a, C> {
    client: C,
    schema: &'a ResourceSchema,
    clock: Arc<dyn Clock>,
}

impl<'a, C: RemoteClient> Reconciler<'a, C> {
    pub fn new(client: C, schema: &'a ResourceSchema) -> Self {
        Self {
            client,
            schema,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to stamp conditions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn schema(&self) -> &ResourceSchema {
        self.schema
    }

    /// Returns the concrete root path of a desired tree.
    pub fn root_for(&self, desired: &ConfigTree) -> Result<Path, ReconcileError> {
        Ok(self.schema.resolve_root(desired)?)
    }

    fn envelope(&self, action: Action, identity: &ResourceIdentity, root: &Path) -> Envelope {
        Envelope::new(action, identity.name.as_str(), self.schema.level, root.clone())
    }

    /// Reads the resource from the element and classifies what it finds.
    pub async fn observe(
        &self,
        identity: &ResourceIdentity,
        desired: &ConfigTree,
    ) -> Result<Observation, ReconcileError> {
        let root = self.root_for(desired)?;
        let request = self.envelope(Action::Get, identity, &root);
        let response = self.client.get(&root, &request).await?;
        let meta = &response.envelope;
        debug!(
            cache_ready = meta.cache_ready,
            exists = meta.exists,
            has_data = meta.has_data,
            status = %meta.status,
            "Observed"
        );

        if !meta.cache_ready {
            return Ok(Observation::NotReady);
        }
        if meta.exists && meta.status != Status::Success {
            return Ok(Observation::PresentUnknownStatus {
                status: meta.status,
            });
        }
        if !meta.has_data {
            return Ok(if meta.exists {
                Observation::PresentNoData
            } else {
                Observation::AbsentNoData
            });
        }

        let observed = response.data.unwrap_or_else(ConfigTree::empty_map);
        let delta = self.delta(desired, &observed, &root)?;
        Ok(match (meta.exists, delta.is_empty()) {
            (false, _) => Observation::AbsentWithData { delta },
            (true, true) => Observation::PresentUpToDate,
            (true, false) => Observation::PresentStale { delta },
        })
    }

    /// Computes the delta from an observed tree to the desired tree.
    pub fn delta(
        &self,
        desired: &ConfigTree,
        observed: &ConfigTree,
        root: &Path,
    ) -> Result<Delta, ReconcileError> {
        let refs = &self.schema.reference_paths;
        let flattener = Flattener::new(refs);
        let desired = flattener.flatten(&strip_markers(desired, &self.schema.markers), root)?;
        let observed = flattener.flatten(&normalize_entry_lists(observed, root, refs), root)?;
        Ok(diff(&desired, &observed))
    }

    /// Creates the resource with replace semantics.
    pub async fn create(
        &self,
        identity: &ResourceIdentity,
        desired: &ConfigTree,
    ) -> Result<(), ReconcileError> {
        let root = self.root_for(desired)?;
        let stripped = strip_markers(desired, &self.schema.markers);
        let updates = Flattener::new(&self.schema.reference_paths).flatten(&stripped, &root)?;
        if updates.is_empty() {
            return Err(ReconcileError::NothingToCreate {
                resource: identity.to_string(),
            });
        }
        info!(root = %root, paths = updates.len(), "Creating resource");
        let request = SetRequest::new(root.clone(), self.envelope(Action::Create, identity, &root))
            .with_replace(updates);
        self.client.set(request).await
    }

    /// Applies a delta to the resource at `root`.
    pub async fn update(
        &self,
        identity: &ResourceIdentity,
        root: &Path,
        delta: &Delta,
    ) -> Result<(), ReconcileError> {
        info!(
            root = %root,
            updates = delta.updates.len(),
            deletes = delta.deletes.len(),
            "Updating resource"
        );
        let request = SetRequest::new(root.clone(), self.envelope(Action::Update, identity, root))
            .with_updates(delta.updates.clone())
            .with_deletes(delta.deletes.clone());
        self.client.set(request).await
    }

    /// Deletes the resource at `root`.
    pub async fn delete(&self, identity: &ResourceIdentity, root: &Path) -> Result<(), ReconcileError> {
        info!(root = %root, "Deleting resource");
        let request = SetRequest::new(root.clone(), self.envelope(Action::Delete, identity, root))
            .with_deletes(vec![Path::new()]);
        self.client.set(request).await
    }

    /// Runs one reconcile cycle for `record`.
    ///
    /// Conditions are written to the record on every path, including
    /// failures.
    pub async fn reconcile<R>(&self, record: &mut R) -> Result<ReconcileOutcome, ReconcileError>
    where
        R: DesiredState + ?Sized,
    {
        let span = info_span!("reconcile", resource = %record.identity());
        async {
            let mut conditions = ConditionSet::default();
            let result = self.cycle(record, &mut conditions).await;
            match &result {
                Ok(outcome) => {
                    debug!(?outcome, "Reconciled");
                    conditions.set(Condition::reconcile_success());
                }
                Err(err) => {
                    warn!(error = %err, retryable = err.is_retryable(), "Reconcile failed");
                    conditions.set(Condition::reconcile_error(err.to_string()));
                }
            }
            record.set_conditions(conditions.finish(self.clock.as_ref()));
            result
        }
        .instrument(span)
        .await
    }

    async fn cycle<R>(
        &self,
        record: &mut R,
        conditions: &mut ConditionSet,
    ) -> Result<ReconcileOutcome, ReconcileError>
    where
        R: DesiredState + ?Sized,
    {
        let identity = record.identity().clone();
        let desired = record.desired_tree();
        let root = self.root_for(&desired)?;

        if record.deletion_requested() {
            conditions.set(Condition::deleting());
            self.delete(&identity, &root).await?;
            return Ok(ReconcileOutcome::Deleted);
        }

        if !self.schema.local_leafrefs.is_empty() {
            let validation = validate(ValidationMode::Local, &desired, None, &self.schema.local_leafrefs)?;
            if !validation.success {
                let message = validation.failure_message();
                info!(%message, "Local leaf-refs do not resolve");
                conditions.set(Condition::leafref_invalid(ConditionKind::LocalLeafRefValid, message));
                conditions.set(Condition::unavailable());
                return Ok(ReconcileOutcome::LocalLeafRefBlocked {
                    failures: validation.failures().cloned().collect(),
                });
            }
            conditions.set(Condition::leafref_valid(ConditionKind::LocalLeafRefValid));
        }

        let observation = self.observe(&identity, &desired).await?;
        if observation == Observation::NotReady {
            debug!("Element cache not ready");
            conditions.set(Condition::cache_not_ready());
            return Ok(ReconcileOutcome::NotReady);
        }
        // Index repair and sets wait until the element reports a settled resource.
        if matches!(
            observation,
            Observation::PresentNoData | Observation::PresentUnknownStatus { .. }
        ) {
            debug!(?observation, "Resource present but not settled");
            conditions.set(Condition::unavailable());
            return Ok(ReconcileOutcome::Waiting { observation });
        }

        let previous = record.index_map();
        let stripped = strip_markers(&desired, &self.schema.markers);
        let change = IndexTracker::new(&self.schema.reference_paths).track(&root, &previous, &stripped);
        if change.changed {
            info!(deletes = change.delete_paths.len(), "Deleting entries of renamed keys");
            let request = SetRequest::new(root.clone(), self.envelope(Action::Update, &identity, &root))
                .with_deletes(change.delete_paths.clone());
            self.client.set(request).await?;
            record.set_index_map(change.next);
            conditions.set(Condition::updating());
            return Ok(ReconcileOutcome::IndexRepaired {
                deleted: change.delete_paths,
            });
        }
        if change.next != previous {
            record.set_index_map(change.next);
        }

        if !self.schema.external_leafrefs.is_empty() {
            let config = self.client.get_config().await?;
            let validation = validate(
                ValidationMode::External,
                &desired,
                Some(&config),
                &self.schema.external_leafrefs,
            )?;
            if !validation.success {
                let message = validation.failure_message();
                info!(%message, "External leaf-refs do not resolve");
                conditions.set(Condition::leafref_invalid(ConditionKind::ExternalLeafRefValid, message));
                conditions.set(Condition::unavailable());
                return Ok(ReconcileOutcome::ExternalLeafRefBlocked {
                    failures: validation.failures().cloned().collect(),
                });
            }
            conditions.set(Condition::leafref_valid(ConditionKind::ExternalLeafRefValid));
        }

        match observation {
            Observation::AbsentNoData => {
                self.create(&identity, &desired).await?;
                conditions.set(Condition::creating());
                Ok(ReconcileOutcome::Created)
            }
            Observation::AbsentWithData { delta } | Observation::PresentStale { delta }
                if !delta.is_empty() =>
            {
                self.update(&identity, &root, &delta).await?;
                conditions.set(Condition::updating());
                Ok(ReconcileOutcome::Updated { delta })
            }
            Observation::AbsentWithData { .. }
            | Observation::PresentStale { .. }
            | Observation::PresentUpToDate => {
                conditions.set(Condition::available());
                Ok(ReconcileOutcome::UpToDate)
            }
            observation => {
                conditions.set(Condition::unavailable());
                Ok(ReconcileOutcome::Waiting { observation })
            }
        }
    }
}
