//! Device-type registration on every target.
//!
//! Before any resource can be reconciled, each target's device driver must
//! know which device type this engine manages. The registration lives under
//! `register[device-type=<type>]` and is written to all targets at once
//! through a [`FanOut`].

use tracing::{Instrument, info, info_span};

use super::client::{RemoteClient, SetRequest};
use super::envelope::{Action, Envelope};
use super::errors::ReconcileError;
use super::fanout::FanOut;
use crate::tree::{ConfigTree, Path, PathElem, PathValue};

/// Name of the registration path element.
pub const REGISTER_ELEM: &str = "register";

/// Key of the registration path element.
pub const REGISTER_KEY: &str = "device-type";

/// What the targets report about the registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    /// Every target holds the registration for this device type.
    Registered,
    /// A target has no registration, or one for another device type.
    Mismatch {
        target: String,
        found: Option<String>,
    },
}

/// The registration of one device type on a set of targets.
pub struct Registration<C> {
    device_type: String,
    spec: ConfigTree,
    targets: FanOut<C>,
}

impl<C: RemoteClient> Registration<C> {
    /// Creates a registration. `spec` is the registration body, such as the
    /// subscriptions the driver should open.
    pub fn new(device_type: impl Into<String>, spec: ConfigTree, targets: FanOut<C>) -> Self {
        Self {
            device_type: device_type.into(),
            spec,
            targets,
        }
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn targets(&self) -> &FanOut<C> {
        &self.targets
    }

    /// The path the registration lives at.
    pub fn path(&self) -> Path {
        Path::new().push(PathElem::new(REGISTER_ELEM).with_key(REGISTER_KEY, self.device_type.as_str()))
    }

    fn envelope(&self, action: Action) -> Envelope {
        Envelope::new(action, self.device_type.as_str(), 0, self.path())
    }

    fn body(&self) -> ConfigTree {
        let mut body = match &self.spec {
            ConfigTree::Map(fields) => fields.clone(),
            _ => Default::default(),
        };
        body.insert(REGISTER_KEY.to_string(), ConfigTree::from(self.device_type.as_str()));
        ConfigTree::Map(body)
    }

    /// Checks that every target reports this device type.
    pub async fn observe(&self) -> Result<RegistrationState, ReconcileError> {
        let responses = self.targets.get_all(&self.path(), &self.envelope(Action::Get)).await?;
        for (target, response) in responses {
            let found = response
                .data
                .as_ref()
                .and_then(|data| data.get(REGISTER_KEY))
                .and_then(ConfigTree::key_string);
            if found.as_deref() != Some(self.device_type.as_str()) {
                return Ok(RegistrationState::Mismatch { target, found });
            }
        }
        Ok(RegistrationState::Registered)
    }

    /// Writes the registration to every target, replacing what is there.
    pub async fn create(&self) -> Result<(), ReconcileError> {
        let request = SetRequest::new(self.path(), self.envelope(Action::Create))
            .with_replace(vec![PathValue::new(Path::new(), self.body())]);
        self.targets.set(request).await
    }

    /// Merges the registration into what every target holds.
    pub async fn update(&self) -> Result<(), ReconcileError> {
        let request = SetRequest::new(self.path(), self.envelope(Action::Update))
            .with_updates(vec![PathValue::new(Path::new(), self.body())]);
        self.targets.set(request).await
    }

    /// Removes the registration from every target.
    pub async fn delete(&self) -> Result<(), ReconcileError> {
        let request = SetRequest::new(self.path(), self.envelope(Action::Delete))
            .with_deletes(vec![Path::new()]);
        self.targets.set(request).await
    }

    /// Registers on all targets unless every target already reports this
    /// device type. Returns the state observed before acting.
    pub async fn ensure(&self) -> Result<RegistrationState, ReconcileError> {
        let span = info_span!("registration", device_type = %self.device_type);
        async {
            let state = self.observe().await?;
            if let RegistrationState::Mismatch { target, found } = &state {
                info!(mismatched = %target, ?found, "Registering device type on all targets");
                self.create().await?;
            }
            Ok(state)
        }
        .instrument(span)
        .await
    }
}
