//! Work item span helpers.
//!
//! One span wraps a single item's trip through the pipeline so every log
//! line for that item carries its identity.

use crate::model::{Outcome, Status, WorkId};
use tracing::Span;

/// Start a span for one item's processing attempt.
///
/// `work.outcome` is declared empty and filled in once the attempt ends.
pub fn start_work_span(slug: &str, work_id: &WorkId) -> Span {
    tracing::info_span!(
        "work.process",
        "work.id" = %work_id,
        "work.slug" = slug,
        "work.outcome" = tracing::field::Empty,
    )
}

/// Emit a status change inside the item's span.
pub fn record_state_transition(span: &Span, from: Status, to: Status) {
    span.in_scope(|| {
        tracing::info!(from = from.as_str(), to = to.as_str(), "status changed");
    });
}

pub fn record_outcome(span: &Span, outcome: Outcome) {
    span.record("work.outcome", outcome.as_str());
}
