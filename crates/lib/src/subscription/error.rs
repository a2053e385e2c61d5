//! Error types for the subscription manager.

use thiserror::Error;

use crate::tree::PathError;

/// Errors that can occur while managing targets and their streams.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubscriptionError {
    /// Opening a session did not finish within the connect timeout.
    #[error("Timed out connecting to target '{target}' after {timeout_ms} ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    /// The session factory refused the target.
    #[error("Failed to connect to target '{target}': {reason}")]
    ConnectionFailed { target: String, reason: String },

    /// A subscription could not be opened or its stream broke.
    #[error("Stream '{name}' on target '{target}' failed: {reason}")]
    Stream {
        target: String,
        name: String,
        reason: String,
    },

    /// The target is not known, or is being removed.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// A subscription with this name already runs on the target.
    #[error("Subscription '{name}' already exists on target '{target}'")]
    SubscriptionExists { target: String, name: String },

    #[error("Subscription '{name}' not found on target '{target}'")]
    SubscriptionNotFound { target: String, name: String },

    /// A configured subscription path does not parse.
    #[error("Invalid subscription path: {0}")]
    InvalidPath(#[from] PathError),

    /// The dispatcher task has stopped.
    #[error("Failed to send command to subscription manager: {0}")]
    CommandSendError(String),
}

impl SubscriptionError {
    /// Returns the target the error is about, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            SubscriptionError::ConnectTimeout { target, .. }
            | SubscriptionError::ConnectionFailed { target, .. }
            | SubscriptionError::Stream { target, .. }
            | SubscriptionError::SubscriptionExists { target, .. }
            | SubscriptionError::SubscriptionNotFound { target, .. } => Some(target),
            SubscriptionError::TargetNotFound(target) => Some(target),
            _ => None,
        }
    }

    /// Check if this is a connection error.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            SubscriptionError::ConnectTimeout { .. } | SubscriptionError::ConnectionFailed { .. }
        )
    }

    /// Check if a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_connect_error() || matches!(self, SubscriptionError::Stream { .. })
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SubscriptionError::TargetNotFound(_) | SubscriptionError::SubscriptionNotFound { .. }
        )
    }
}

impl From<SubscriptionError> for crate::Error {
    fn from(err: SubscriptionError) -> Self {
        crate::Error::Subscription(err)
    }
}
