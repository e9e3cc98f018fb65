//! In-process repository.
//!
//! Holds items and results in memory and journals every call so tests can
//! assert on exactly what the scheduler asked of the store. Failures can be
//! injected per operation.

use crate::error::{Error, Result};
use crate::model::work::validate_transition;
use crate::model::{ProcessingResult, Status, WorkId, WorkItem};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::Repository;

/// One recorded repository call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    HealthCheck,
    ListPending,
    UpdateStatus { id: WorkId, from: Status, to: Status },
    SaveResult { item_id: WorkId },
}

#[derive(Default)]
struct Inner {
    items: Vec<WorkItem>,
    results: Vec<ProcessingResult>,
    journal: Vec<RepoCall>,
    fail_health: bool,
    fail_list: bool,
    fail_saves: bool,
    fail_updates: HashSet<(WorkId, Status)>,
}

#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave Inner half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a `pending` item. Creation times are strictly increasing in
    /// insertion order.
    pub fn insert(&self, display_name: impl Into<String>) -> WorkItem {
        let mut item = WorkItem::new(display_name);
        let mut inner = self.lock();
        if let Some(last) = inner.items.iter().map(|i| i.created_at).max() {
            if item.created_at <= last {
                item.created_at = last + Duration::microseconds(1);
                item.updated_at = item.created_at;
            }
        }
        inner.items.push(item.clone());
        item
    }

    /// Add an item exactly as given.
    pub fn insert_item(&self, item: WorkItem) {
        self.lock().items.push(item);
    }

    pub fn item(&self, id: WorkId) -> Option<WorkItem> {
        self.lock().items.iter().find(|i| i.id == id).cloned()
    }

    pub fn results(&self) -> Vec<ProcessingResult> {
        self.lock().results.clone()
    }

    pub fn results_for(&self, id: WorkId) -> Vec<ProcessingResult> {
        self.lock()
            .results
            .iter()
            .filter(|r| r.item_id == id)
            .cloned()
            .collect()
    }

    pub fn journal(&self) -> Vec<RepoCall> {
        self.lock().journal.clone()
    }

    pub fn fail_health_check(&self, fail: bool) {
        self.lock().fail_health = fail;
    }

    pub fn fail_list_pending(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    pub fn fail_save_result(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Make every update of `id` to `to` fail.
    pub fn fail_update(&self, id: WorkId, to: Status) {
        self.lock().fail_updates.insert((id, to));
    }
}

impl Repository for MemoryRepository {
    async fn health_check(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.journal.push(RepoCall::HealthCheck);
        if inner.fail_health {
            return Err(Error::Other("repository unreachable".to_string()));
        }
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<WorkItem>> {
        let mut inner = self.lock();
        inner.journal.push(RepoCall::ListPending);
        if inner.fail_list {
            return Err(Error::Other("pending query failed".to_string()));
        }
        let mut pending: Vec<WorkItem> = inner
            .items
            .iter()
            .filter(|i| i.status == Status::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|i| i.created_at);
        Ok(pending)
    }

    async fn update_status(&self, id: WorkId, from: Status, to: Status) -> Result<WorkItem> {
        let mut inner = self.lock();
        inner.journal.push(RepoCall::UpdateStatus { id, from, to });
        validate_transition(from, to)?;
        if inner.fail_updates.contains(&(id, to)) {
            return Err(Error::Other(format!("update of {id} to {to} failed")));
        }

        let item = inner
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::NotFound(format!("work item {id}")))?;
        if item.status != from {
            return Err(Error::InvalidTransition {
                from: item.status.to_string(),
                to: to.to_string(),
            });
        }
        item.status = to;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn save_result(&self, result: &ProcessingResult) -> Result<()> {
        let mut inner = self.lock();
        inner.journal.push(RepoCall::SaveResult {
            item_id: result.item_id,
        });
        if inner.fail_saves {
            return Err(Error::Other("result insert failed".to_string()));
        }
        inner.results.push(result.clone());
        Ok(())
    }
}
