//! Remote targets and their connection state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to reach one remote element.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique name of the target.
    pub name: String,
    /// Network address, such as `10.0.0.1:57400`.
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Connect without TLS.
    #[serde(default)]
    pub insecure: bool,
    /// Use TLS but accept any certificate.
    #[serde(default)]
    pub skip_verify: bool,
    /// Overrides the manager's connect timeout for this target.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TargetConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            username: None,
            password: None,
            insecure: false,
            skip_verify: false,
            timeout_ms: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_skip_verify(mut self, skip_verify: bool) -> Self {
        self.skip_verify = skip_verify;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// The connect timeout for this target, falling back to `default`.
    pub fn connect_timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

// Keep the password out of logs.
impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("insecure", &self.insecure)
            .field("skip_verify", &self.skip_verify)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Lifecycle of a target in the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetState {
    /// Not known to the manager.
    #[default]
    Absent,
    /// A session is being opened or a broken stream is being restored.
    Connecting,
    /// At least one stream is open.
    Subscribed,
    /// Being removed; streams are stopping.
    Draining,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
