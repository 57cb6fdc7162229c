//! Metric instrument factories.
//!
//! All instruments come from the `"lockq"` meter on the global
//! `MeterProvider`; without OTLP export they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("lockq")
}

/// Counter: submissions.
/// Labels: `result` ("ok" | "invalid" | "error").
pub fn work_submitted() -> Counter<u64> {
    meter()
        .u64_counter("lockq.work.submitted")
        .with_description("Number of work items submitted")
        .build()
}

/// Counter: work item state transitions.
/// Labels: `from`, `to`.
pub fn work_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("lockq.work.state_transitions")
        .with_description("Number of work item state transitions")
        .build()
}

/// Counter: how waits ended.
/// Labels: `outcome` ("completed" | "failed" | "timeout").
pub fn wait_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("lockq.wait.outcomes")
        .with_description("Number of finished outcome waits")
        .build()
}

/// Histogram: time a requester spent waiting for its outcome.
pub fn wait_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("lockq.wait.duration_ms")
        .with_description("Outcome wait duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: terminal items removed by retention.
pub fn retention_removed() -> Counter<u64> {
    meter()
        .u64_counter("lockq.retention.removed")
        .with_description("Number of terminal work items removed by retention")
        .build()
}
