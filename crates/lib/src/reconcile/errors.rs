//! Error types for the reconcile module.

use thiserror::Error;

use crate::flatten::FlattenError;
use crate::leafref::LeafRefError;
use crate::schema::SchemaError;

/// Errors that abort a reconcile cycle.
///
/// Validation failures and renamed list entries are not errors; they are
/// reported as [`ReconcileOutcome`](super::ReconcileOutcome)s.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconcileError {
    /// The remote element could not be reached or rejected the request.
    /// The next cycle may succeed.
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// A tree does not match its reference table. Retrying the same data
    /// fails the same way.
    #[error("Failed to decode tree: {0}")]
    Decode(#[from] FlattenError),

    /// The resource's schema cannot be applied to its desired tree.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A leaf-ref rule is malformed.
    #[error(transparent)]
    LeafRef(#[from] LeafRefError),

    /// The desired tree flattens to no updates.
    #[error("Nothing to create for resource '{resource}'")]
    NothingToCreate { resource: String },

    /// A request sent to several targets failed on one of them.
    #[error("Request failed on target '{target}' after {completed} target(s) succeeded: {source}")]
    PartialMultiTarget {
        target: String,
        completed: usize,
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Creates a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        ReconcileError::Transport {
            reason: reason.into(),
        }
    }

    /// Check if the next cycle may succeed without any change to the data.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Transport { .. } => true,
            ReconcileError::PartialMultiTarget { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error is a decode failure.
    pub fn is_decode_error(&self) -> bool {
        match self {
            ReconcileError::Decode(_) => true,
            ReconcileError::PartialMultiTarget { source, .. } => source.is_decode_error(),
            _ => false,
        }
    }

    /// Check if this error involves a missing schema.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::Schema(err) if err.is_not_found())
    }

    /// Returns the failing target of a multi-target request.
    pub fn failed_target(&self) -> Option<&str> {
        match self {
            ReconcileError::PartialMultiTarget { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl From<ReconcileError> for crate::Error {
    fn from(err: ReconcileError) -> Self {
        crate::Error::Reconcile(err)
    }
}
