//! Engine configuration.
//!
//! [`EngineConfig`] is read from a JSON file at start-up. Every field has a
//! default, so an empty object is a valid configuration.

use std::path::{Path as FsPath, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the subscription every target gets when it is added.
pub const DEFAULT_SUBSCRIPTION: &str = "config-changes";

/// Root path of the change notifications published by a remote element.
pub const DEFAULT_SUBSCRIPTION_ROOT: &str = "provider-resource-update";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid configuration.
    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}

/// Top-level configuration of an engine process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub subscription: SubscriptionConfig,
    /// Location of the resource schema document.
    pub schema_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Reads a configuration from a JSON file.
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: shown.clone(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: shown.clone(),
                source,
            })?;
        config.validate()?;
        debug!(path = %shown, "Loaded engine config");
        Ok(config)
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sub = &self.subscription;
        if sub.receive_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "subscription.receive_buffer",
                reason: "must be at least 1".to_string(),
            });
        }
        if sub.backoff.base_ms == 0 || sub.backoff.base_ms > sub.backoff.max_ms {
            return Err(ConfigError::InvalidValue {
                field: "subscription.backoff",
                reason: format!(
                    "base_ms ({}) must be non-zero and not above max_ms ({})",
                    sub.backoff.base_ms, sub.backoff.max_ms
                ),
            });
        }
        Ok(())
    }
}

/// Settings of the subscription manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Name of the default subscription opened on every target.
    pub name: String,
    /// Root path of the default subscription.
    pub root_path: String,
    /// Capacity of the command and event channels.
    pub receive_buffer: usize,
    /// Time allowed for opening a session.
    pub connect_timeout_ms: u64,
    pub backoff: BackoffConfig,
}

impl SubscriptionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SUBSCRIPTION.to_string(),
            root_path: DEFAULT_SUBSCRIPTION_ROOT.to_string(),
            receive_buffer: 1000,
            connect_timeout_ms: 5_000,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Reconnect backoff of a subscription stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay ceiling of the first retry.
    pub base_ms: u64,
    /// Largest delay ceiling.
    pub max_ms: u64,
    /// Reconnect attempts before the target is removed.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 60_000,
            max_attempts: 10,
        }
    }
}
