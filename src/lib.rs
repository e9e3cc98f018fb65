//! # bootstrap-runner
//!
//! Scans a Postgres-backed store for pending work items, runs the external
//! bootstrap pipeline for each one under a timeout, harvests the artifacts
//! it leaves behind, and records the outcome.
//!
//! Processing is strictly sequential: one scan cycle at a time, one item at
//! a time, one subprocess in flight.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod telemetry;
