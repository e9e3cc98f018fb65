//! Work item repository: the store of record for item status and results.
//!
//! The scheduler only ever talks to a [`Repository`]. [`Db`] is the
//! Postgres implementation used in production; [`MemoryRepository`] is an
//! in-process stand-in for tests and the synthetic pipeline run.

pub mod memory;
pub mod work;

pub use memory::{MemoryRepository, RepoCall};

use crate::error::Result;
use crate::model::{ProcessingResult, Status, WorkId, WorkItem};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::future::Future;

/// Operations the orchestrator needs from the record store.
pub trait Repository: Send + Sync + 'static {
    /// Cheap connectivity check, run before the scheduler starts.
    fn health_check(&self) -> impl Future<Output = Result<()>> + Send;

    /// Items awaiting processing, oldest first. Empty is not an error.
    fn list_pending(&self) -> impl Future<Output = Result<Vec<WorkItem>>> + Send;

    /// Move an item from `from` to `to`. Fails if the transition is illegal
    /// or the stored status is no longer `from`.
    fn update_status(
        &self,
        id: WorkId,
        from: Status,
        to: Status,
    ) -> impl Future<Output = Result<WorkItem>> + Send;

    /// Persist the outcome of one processing attempt.
    fn save_result(&self, result: &ProcessingResult) -> impl Future<Output = Result<()>> + Send;
}

/// Database handle. Owns the Postgres connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool (for submodules).
    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
