//! Result recorder: turns a finished attempt into a persisted
//! [`ProcessingResult`].

use crate::db::Repository;
use crate::model::{Outcome, ProcessingResult, WorkItem};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

use super::artifacts::CollectedArtifacts;

pub struct ResultRecorder<R> {
    repo: Arc<R>,
}

impl<R: Repository> ResultRecorder<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Build the result and hand it to the repository.
    ///
    /// A persistence failure is logged and swallowed; the built result is
    /// returned either way so the caller can still make the terminal
    /// transition.
    pub async fn record(
        &self,
        item: &WorkItem,
        slug: &str,
        outcome: Outcome,
        duration_ms: u64,
        artifacts: Option<&CollectedArtifacts>,
        error: Option<&str>,
    ) -> ProcessingResult {
        let result = ProcessingResult {
            item_id: item.id,
            slug: slug.to_string(),
            outcome,
            summary_path: artifacts.and_then(|a| a.summary_path.clone()),
            output_path: artifacts.and_then(|a| a.results_dir.clone()),
            error_message: error.map(str::to_string),
            duration_ms,
            timestamp: Utc::now(),
        };

        match self.repo.save_result(&result).await {
            Ok(()) => debug!(id = %item.id, outcome = %outcome, "result recorded"),
            Err(e) => error!(id = %item.id, outcome = %outcome, error = %e, "failed to record result"),
        }

        result
    }
}
