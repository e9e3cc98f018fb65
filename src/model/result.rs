//! Processing results: the persisted outcome of one processing attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::work::{Status, WorkId};

/// Whether a processing attempt succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    /// The terminal status an item takes for this outcome.
    pub fn terminal_status(self) -> Status {
        match self {
            Outcome::Success => Status::Completed,
            Outcome::Error => Status::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "success" => Ok(Outcome::Success),
            "error" => Ok(Outcome::Error),
            other => Err(crate::error::Error::Other(format!("unknown outcome: {other}"))),
        }
    }
}

/// Outcome record for one processed work item. Never mutated once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub item_id: WorkId,
    pub slug: String,
    pub outcome: Outcome,
    /// Relocated summary document, if one was found.
    pub summary_path: Option<PathBuf>,
    /// Directory holding relocated result files, if any were found.
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}
