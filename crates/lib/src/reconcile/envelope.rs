//! Resource metadata exchanged with the remote element.
//!
//! Every get and set carries an [`Envelope`] on the transport's extension
//! channel. Requests tell the element which resource they are about; get
//! responses come back with the element's view of that resource: whether its
//! cache is ready, whether the resource exists, whether data is present, and
//! the status of the last change applied to it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::Path;

/// What a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Get,
    Create,
    Update,
    Delete,
    GetResourceName,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Get => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::GetResourceName => "get-resource-name",
        };
        f.write_str(s)
    }
}

/// Status of the last change the element applied to a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    None,
    Pending,
    Success,
    Failed,
}

impl Status {
    fn severity(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::None => 1,
            Status::Pending => 2,
            Status::Failed => 3,
        }
    }

    /// Returns the less healthy of two statuses.
    pub fn worst(self, other: Status) -> Status {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::None => "none",
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-request resource metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub action: Action,
    /// Name of the resource the request is about.
    pub resource: String,
    pub level: u32,
    pub root_path: Path,
    #[serde(default)]
    pub cache_ready: bool,
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub status: Status,
}

impl Envelope {
    /// Creates a request envelope. Response fields start out false.
    pub fn new(action: Action, resource: impl Into<String>, level: u32, root_path: Path) -> Self {
        Self {
            action,
            resource: resource.into(),
            level,
            root_path,
            cache_ready: false,
            exists: false,
            has_data: false,
            status: Status::None,
        }
    }

    pub fn with_cache_ready(mut self, ready: bool) -> Self {
        self.cache_ready = ready;
        self
    }

    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = exists;
        self
    }

    pub fn with_has_data(mut self, has_data: bool) -> Self {
        self.has_data = has_data;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Encodes the envelope for the extension channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes an envelope received on the extension channel.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
