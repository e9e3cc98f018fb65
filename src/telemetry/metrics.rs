//! Metric instrument factories for bootstrap-runner.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one (no OTLP endpoint, tests) every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("bootstrap-runner")
}

/// Counter: scan cycles run.
/// Labels: `result` ("ok" | "query_failed").
pub fn scan_cycles() -> Counter<u64> {
    meter()
        .u64_counter("runner.scan.cycles")
        .with_description("Number of scan cycles run")
        .build()
}

/// Counter: work items that reached a terminal status.
/// Labels: `outcome` ("success" | "error").
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("runner.items.processed")
        .with_description("Number of work items processed")
        .build()
}

/// Counter: work item status transitions persisted.
/// Labels: `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("runner.items.state_transitions")
        .with_description("Number of work item status transitions")
        .build()
}

/// Histogram: build subprocess wall-clock time.
pub fn build_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("runner.build.duration_ms")
        .with_description("Build pipeline duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: builds killed for exceeding the timeout.
pub fn build_timeouts() -> Counter<u64> {
    meter()
        .u64_counter("runner.build.timeouts")
        .with_description("Number of builds killed on timeout")
        .build()
}
