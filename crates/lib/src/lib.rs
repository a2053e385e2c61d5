//!
//! netconverge: declarative configuration reconciliation for network elements.
//! This library keeps the live configuration of remote elements converged on
//! an operator's desired configuration tree.
//!
//! ## Core Concepts
//!
//! * **Trees (`tree::ConfigTree`)**: Generic JSON-like configuration values, addressed by keyed paths (`tree::Path`).
//! * **Flattening (`flatten`)**: Turns a nested tree into path/value pairs relative to a resource root, honoring list-entry keys.
//! * **Deltas (`delta`)**: The minimal updates and prefix-maximal deletes that move an observed tree to a desired one.
//! * **Leaf-refs (`leafref`)**: Cross-references from one leaf to a list entry, checked within a tree or against the live configuration.
//! * **Index tracking (`index`)**: Remembers list-entry keys between cycles so renamed entries are deleted on the element.
//! * **Schemas (`schema::SchemaRegistry`)**: Per-kind tables of root paths, reference paths and leaf-ref rules, loaded from JSON.
//! * **Reconciliation (`reconcile::Reconciler`)**: The per-resource cycle deciding whether to create, update, delete or wait.
//! * **Subscriptions (`subscription::SubscriptionManager`)**: Keeps every target's change-notification stream alive.

pub mod clock;
pub mod config;
pub mod delta;
pub mod flatten;
pub mod index;
pub mod leafref;
pub mod reconcile;
pub mod schema;
pub mod subscription;
pub mod tree;

/// Re-export the clock types for easier access.
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};

/// Result type used throughout the netconverge library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the netconverge library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured path parsing errors from the tree module
    #[error(transparent)]
    Path(tree::PathError),

    /// Structured flattening errors from the flatten module
    #[error(transparent)]
    Flatten(flatten::FlattenError),

    /// Structured leaf-ref errors from the leafref module
    #[error(transparent)]
    LeafRef(leafref::LeafRefError),

    /// Structured schema errors from the schema module
    #[error(transparent)]
    Schema(schema::SchemaError),

    /// Structured reconcile errors from the reconcile module
    #[error(transparent)]
    Reconcile(reconcile::ReconcileError),

    /// Structured subscription errors from the subscription module
    #[error(transparent)]
    Subscription(subscription::SubscriptionError),

    /// Structured configuration errors from the config module
    #[error(transparent)]
    Config(config::ConfigError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Path(_) => "tree",
            Error::Flatten(_) => "flatten",
            Error::LeafRef(_) => "leafref",
            Error::Schema(_) => "schema",
            Error::Reconcile(_) => "reconcile",
            Error::Subscription(_) => "subscription",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Schema(schema_err) => schema_err.is_not_found(),
            Error::Reconcile(reconcile_err) => reconcile_err.is_not_found(),
            Error::Subscription(subscription_err) => subscription_err.is_not_found(),
            Error::Io(io_err) => io_err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Reconcile(reconcile_err) => reconcile_err.is_retryable(),
            Error::Subscription(subscription_err) => subscription_err.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error means a tree could not be read.
    pub fn is_decode_error(&self) -> bool {
        match self {
            Error::Path(_) | Error::Flatten(_) | Error::Serialize(_) => true,
            Error::Reconcile(reconcile_err) => reconcile_err.is_decode_error(),
            _ => false,
        }
    }

    /// Check if this error comes from loading configuration or schemas.
    pub fn is_config_error(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Schema(schema_err) => schema_err.is_load_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Config(config::ConfigError::Io { .. }) => true,
            Error::Schema(schema::SchemaError::Io { .. }) => true,
            _ => false,
        }
    }
}
