//! Per-target change-notification streams.
//!
//! The [`SubscriptionManager`] keeps one entry per remote target. Targets
//! are added and removed through an ordered command channel consumed by a
//! single dispatcher task; each open subscription runs in its own task that
//! forwards notifications as [`ChangeEvent`]s. A stream that breaks is
//! restored with jittered exponential [`Backoff`]; a target whose stream
//! cannot be restored is dropped and must be added again.
//!
//! ```
//! use netconverge::config::SubscriptionConfig;
//! use netconverge::subscription::{MemorySessionFactory, SubscriptionManager, TargetConfig, TargetState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), netconverge::Error> {
//! let (manager, _events) =
//!     SubscriptionManager::start(MemorySessionFactory::new(), &SubscriptionConfig::default())?;
//! manager.add_target(TargetConfig::new("leaf1", "10.0.0.1:57400")).await?;
//! assert!(manager.has_subscription("leaf1", "config-changes").await);
//! manager.delete_target("leaf1").await?;
//! assert_eq!(manager.target_state("leaf1").await, TargetState::Absent);
//! # Ok(())
//! # }
//! ```

mod backoff;
mod error;
mod manager;
mod session;
mod target;

pub use backoff::Backoff;
pub use error::SubscriptionError;
pub use manager::{ChangeEvent, SubscriptionManager, TargetCommand};
#[cfg(any(test, feature = "testing"))]
pub use session::MemorySessionFactory;
pub use session::{Notification, NotificationStream, Session, SessionFactory};
pub use target::{TargetConfig, TargetState};
