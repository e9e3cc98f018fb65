//! Per-item pipeline: claim, build, collect, record, retire.
//!
//! Every step returns a value instead of bailing out of the cycle. Once an
//! item has been claimed (`in_progress` persisted), exactly one terminal
//! transition is attempted for it, whatever went wrong in between.

use crate::config::Settings;
use crate::db::Repository;
use crate::error::{Error, Result};
use crate::model::{Outcome, ProcessingResult, Status, WorkId, WorkItem};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_outcome, record_state_transition, start_work_span};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span, error, info, warn};

use super::artifacts::{ArtifactCollector, CollectedArtifacts};
use super::invoker::BuildInvoker;
use super::recorder::ResultRecorder;

/// How one item's trip through the pipeline ended.
#[derive(Debug, Clone)]
pub enum ItemReport {
    /// The attempt ran. `status` is the terminal status the item was moved
    /// to, `failed` when marking it `completed` did not persist. `retired`
    /// is false when no terminal update persisted at all.
    Finished {
        id: WorkId,
        status: Status,
        result: ProcessingResult,
        retired: bool,
    },
    /// The item could not be claimed and was left as it was.
    Skipped { id: WorkId, reason: String },
}

impl ItemReport {
    pub fn id(&self) -> WorkId {
        match self {
            ItemReport::Finished { id, .. } | ItemReport::Skipped { id, .. } => *id,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            ItemReport::Finished { result, .. } => Some(result.outcome),
            ItemReport::Skipped { .. } => None,
        }
    }
}

/// Runs the full processing pipeline for one work item at a time.
pub struct Pipeline<R> {
    repo: Arc<R>,
    invoker: BuildInvoker,
    collector: ArtifactCollector,
    recorder: ResultRecorder<R>,
}

impl<R: Repository> Pipeline<R> {
    pub fn new(repo: Arc<R>, invoker: BuildInvoker, collector: ArtifactCollector) -> Self {
        Self {
            recorder: ResultRecorder::new(Arc::clone(&repo)),
            repo,
            invoker,
            collector,
        }
    }

    /// Wire up the invoker and collector from settings.
    pub fn from_settings(repo: Arc<R>, settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            repo,
            BuildInvoker::from_settings(&settings.build)?,
            ArtifactCollector::from_settings(&settings.artifacts),
        ))
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Drive one item from `pending` to `completed` or `failed`.
    pub async fn process(&self, item: WorkItem) -> ItemReport {
        let slug = item.slug();
        let span = start_work_span(&slug, &item.id);

        async {
            let mut item = item;
            let start = Instant::now();

            if let Err(e) = self.advance(&mut item, Status::InProgress, &span).await {
                warn!(error = %e, "could not claim work item, leaving it for the next cycle");
                return ItemReport::Skipped {
                    id: item.id,
                    reason: e.to_string(),
                };
            }
            info!(name = %item.display_name, "processing started");

            let attempt = self.attempt(&slug).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (outcome, artifacts, error) = match attempt {
                Ok(artifacts) => (Outcome::Success, Some(artifacts), None),
                Err(e) => (Outcome::Error, None, Some(e.to_string())),
            };
            let result = self
                .recorder
                .record(
                    &item,
                    &slug,
                    outcome,
                    duration_ms,
                    artifacts.as_ref(),
                    error.as_deref(),
                )
                .await;

            let (terminal, retired) = self.retire(&mut item, outcome, &span).await;

            record_outcome(&span, outcome);
            metrics::items_processed().add(1, &[KeyValue::new("outcome", outcome.as_str())]);
            match &error {
                None => info!(duration_ms, "processing completed"),
                Some(e) => error!(duration_ms, error = %e, "processing failed"),
            }

            ItemReport::Finished {
                id: item.id,
                status: terminal,
                result,
                retired,
            }
        }
        .instrument(span.clone())
        .await
    }

    /// Make the terminal transition for `outcome`. If marking an item
    /// `completed` fails, fall back to `failed` once so it does not stay
    /// `in_progress`.
    async fn retire(&self, item: &mut WorkItem, outcome: Outcome, span: &Span) -> (Status, bool) {
        let terminal = outcome.terminal_status();
        let first = match self.advance(item, terminal, span).await {
            Ok(()) => return (terminal, true),
            Err(e) => e,
        };
        if terminal == Status::Failed {
            error!(to = %terminal, error = %first, "failed to retire work item");
            return (terminal, false);
        }

        warn!(to = %terminal, error = %first, "failed to retire work item, marking it failed");
        match self.advance(item, Status::Failed, span).await {
            Ok(()) => (Status::Failed, true),
            Err(e) => {
                error!(
                    first_error = %first,
                    fallback_error = %e,
                    "failed to retire work item, left in_progress"
                );
                (Status::Failed, false)
            }
        }
    }

    /// Build, then harvest. Any step's failure becomes the attempt's error.
    async fn attempt(&self, slug: &str) -> Result<CollectedArtifacts> {
        let output = self.invoker.run(slug).await?;
        metrics::build_duration_ms().record(output.duration_ms as f64, &[]);
        if output.timed_out {
            metrics::build_timeouts().add(1, &[]);
            warn!(
                timeout_ms = self.invoker.timeout().as_millis() as u64,
                "build killed after timeout"
            );
        }
        info!(
            phase = "build",
            duration_ms = output.duration_ms,
            exit_code = output.exit_code,
            timed_out = output.timed_out,
            "build finished"
        );
        self.invoker.verdict(&output)?;

        let artifacts = self
            .collector
            .collect(slug)
            .await
            .map_err(|e| Error::Other(format!("artifact collection failed: {e}")))?;
        if artifacts.is_empty() {
            warn!(slug, "build succeeded but left no artifacts");
        }
        Ok(artifacts)
    }

    /// Validate a transition locally, persist it, then apply it.
    async fn advance(&self, item: &mut WorkItem, to: Status, span: &Span) -> Result<()> {
        let from = item.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let stored = self.repo.update_status(item.id, from, to).await?;
        item.transition(to)?;
        item.updated_at = stored.updated_at;

        record_state_transition(span, from, to);
        metrics::state_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
        Ok(())
    }
}
