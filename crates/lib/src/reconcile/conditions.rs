//! Conditions surfaced on a desired-state record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Aspect of a resource a condition describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionKind {
    /// The resource is configured on the element as desired.
    Ready,
    /// The last reconcile cycle completed without error.
    Synced,
    LocalLeafRefValid,
    ExternalLeafRefValid,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// One condition and when it last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_millis: u64,
}

impl Condition {
    pub fn new(kind: ConditionKind, status: ConditionStatus, reason: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            reason: reason.into(),
            message: String::new(),
            last_transition_millis: 0,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Returns `true` if both conditions say the same thing, ignoring time.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.kind == other.kind
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }

    pub fn available() -> Self {
        Self::new(ConditionKind::Ready, ConditionStatus::True, "Available")
    }

    pub fn unavailable() -> Self {
        Self::new(ConditionKind::Ready, ConditionStatus::False, "Unavailable")
    }

    pub fn creating() -> Self {
        Self::new(ConditionKind::Ready, ConditionStatus::False, "Creating")
    }

    pub fn updating() -> Self {
        Self::new(ConditionKind::Ready, ConditionStatus::False, "Updating")
    }

    pub fn deleting() -> Self {
        Self::new(ConditionKind::Ready, ConditionStatus::False, "Deleting")
    }

    pub fn cache_not_ready() -> Self {
        Self::new(ConditionKind::Ready, ConditionStatus::Unknown, "CacheNotReady")
    }

    pub fn reconcile_success() -> Self {
        Self::new(ConditionKind::Synced, ConditionStatus::True, "ReconcileSuccess")
    }

    pub fn reconcile_error(message: impl Into<String>) -> Self {
        Self::new(ConditionKind::Synced, ConditionStatus::False, "ReconcileError").with_message(message)
    }

    pub fn leafref_valid(kind: ConditionKind) -> Self {
        Self::new(kind, ConditionStatus::True, "ValidationSuccess")
    }

    pub fn leafref_invalid(kind: ConditionKind, message: impl Into<String>) -> Self {
        Self::new(kind, ConditionStatus::False, "ValidationFailed").with_message(message)
    }
}

/// Conditions gathered during one cycle, stamped with a common time.
#[derive(Debug, Default)]
pub(crate) struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// Adds or replaces the condition of the same kind.
    pub(crate) fn set(&mut self, condition: Condition) {
        self.conditions.retain(|c| c.kind != condition.kind);
        self.conditions.push(condition);
    }

    pub(crate) fn finish(mut self, clock: &dyn Clock) -> Vec<Condition> {
        let now = clock.now_millis();
        for condition in &mut self.conditions {
            condition.last_transition_millis = now;
        }
        self.conditions.sort_by_key(|c| c.kind);
        self.conditions
    }
}

/// Merges `updates` into `current`, keeping the transition time of
/// conditions whose state did not change.
pub fn merge_conditions(current: &mut Vec<Condition>, updates: Vec<Condition>) {
    for update in updates {
        match current.iter_mut().find(|c| c.kind == update.kind) {
            Some(existing) if existing.same_state(&update) => {}
            Some(existing) => *existing = update,
            None => current.push(update),
        }
    }
    current.sort_by_key(|c| c.kind);
}
