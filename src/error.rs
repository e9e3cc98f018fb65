//! Error types for bootstrap-runner.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("work item not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("build timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
