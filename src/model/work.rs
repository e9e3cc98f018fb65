//! Work items and their status lifecycle.
//!
//! A work item is one display name waiting to be bootstrapped. Its status
//! only ever moves forward: `pending → in_progress → completed | failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::slug::derive_slug;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of pending processing tracked by the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Assigned by the repository.
    pub id: WorkId,

    /// Human-readable name. Immutable for the life of the item; the slug
    /// is derived from it.
    pub display_name: String,

    /// Current lifecycle status.
    pub status: Status,

    pub created_at: DateTime<Utc>,
    /// Refreshed on every status change.
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// A fresh `pending` item, as the repository would create it.
    pub fn new(display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkId::new(),
            display_name: display_name.into(),
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Filesystem-safe identifier for this item's artifacts.
    pub fn slug(&self) -> String {
        derive_slug(&self.display_name)
    }

    /// Apply a status transition locally, refreshing `updated_at`.
    ///
    /// Illegal moves leave the item untouched.
    pub fn transition(&mut self, to: Status) -> Result<()> {
        validate_transition(self.status, to)?;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created externally, waiting for a scan cycle.
    Pending,
    /// Picked up by the scheduler.
    InProgress,
    /// Build succeeded. Terminal.
    Completed,
    /// Build, artifact, or internal failure. Terminal.
    Failed,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, InProgress) | (InProgress, Completed) | (InProgress, Failed)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Status::Pending),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            other => Err(Error::Other(format!("unknown status: {other}"))),
        }
    }
}

/// Validate a status transition, returning an error if disallowed.
pub fn validate_transition(from: Status, to: Status) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
