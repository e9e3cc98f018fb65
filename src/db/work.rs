//! Postgres-backed work item operations.

use crate::error::{Error, Result};
use crate::model::work::validate_transition;
use crate::model::{Outcome, ProcessingResult, Status, WorkId, WorkItem};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

use super::{Db, Repository};

const ITEM_COLUMNS: &str = "id, display_name, status, created_at, updated_at";

impl Repository for Db {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_items
             WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    /// Transition with optimistic concurrency: the row only changes if it
    /// still holds `from`.
    async fn update_status(&self, id: WorkId, from: Status, to: Status) -> Result<WorkItem> {
        validate_transition(from, to)?;

        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "UPDATE work_items SET status = $1, updated_at = now()
             WHERE id = $2 AND status = $3
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(id.0)
        .bind(from.as_str())
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.try_into_work_item(),
            None => Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    async fn save_result(&self, result: &ProcessingResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO processing_results (item_id, slug, outcome, summary_path, output_path, error_message, duration_ms, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(result.item_id.0)
        .bind(&result.slug)
        .bind(result.outcome.as_str())
        .bind(result.summary_path.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .bind(result.output_path.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .bind(&result.error_message)
        .bind(result.duration_ms as i64)
        .bind(result.timestamp)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

impl Db {
    /// Create a new `pending` work item.
    pub async fn submit_item(&self, display_name: &str) -> Result<WorkItem> {
        let row: WorkItemRow = sqlx::query_as(&format!(
            "INSERT INTO work_items (id, display_name, status, created_at, updated_at)
             VALUES ($1, $2, 'pending', now(), now())
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(display_name)
        .fetch_one(self.pool())
        .await?;

        row.try_into_work_item()
    }

    /// Get a work item by ID.
    pub async fn get_item(&self, id: WorkId) -> Result<WorkItem> {
        let row: Option<WorkItemRow> =
            sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM work_items WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("work item {id}")))?
            .try_into_work_item()
    }

    /// List work items, newest first, optionally filtered by status.
    pub async fn list_items(&self, status: Option<Status>, limit: i64) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_items
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(status.map(Status::as_str))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    /// All processing results recorded for an item, oldest first.
    pub async fn results_for(&self, id: WorkId) -> Result<Vec<ProcessingResult>> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            "SELECT item_id, slug, outcome, summary_path, output_path, error_message, duration_ms, created_at
             FROM processing_results WHERE item_id = $1
             ORDER BY created_at ASC",
        )
        .bind(id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(ResultRow::try_into_result).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: Uuid,
    display_name: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        Ok(WorkItem {
            id: WorkId(self.id),
            display_name: self.display_name,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    item_id: Uuid,
    slug: String,
    outcome: String,
    summary_path: Option<String>,
    output_path: Option<String>,
    error_message: Option<String>,
    duration_ms: i64,
    created_at: DateTime<Utc>,
}

impl ResultRow {
    fn try_into_result(self) -> Result<ProcessingResult> {
        Ok(ProcessingResult {
            item_id: WorkId(self.item_id),
            slug: self.slug,
            outcome: self.outcome.parse::<Outcome>()?,
            summary_path: self.summary_path.map(PathBuf::from),
            output_path: self.output_path.map(PathBuf::from),
            error_message: self.error_message,
            duration_ms: self.duration_ms.max(0) as u64,
            timestamp: self.created_at,
        })
    }
}
