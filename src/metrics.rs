// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the synchronization engine.
//!
//! All instruments live in a process-wide registry exposed through the
//! `/metrics` route. Naming uses the `netbox_pdns_` prefix.

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all engine metrics
const METRICS_NAMESPACE: &str = "netbox_pdns";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Total sync operations by trigger and outcome
///
/// Labels:
/// - `trigger`: what fired the sync (`schedule`, `webhook`, `message_bus`, `manual`, `startup`)
/// - `outcome`: `success` or `error`
pub static SYNC_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let counter = CounterVec::new(
        Opts::new(
            format!("{METRICS_NAMESPACE}_syncs_total"),
            "Total sync operations by trigger and outcome",
        ),
        &["trigger", "outcome"],
    )
    .expect("valid metric definition");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

/// Replica zone mutations by operation (`create`, `patch`, `delete`)
pub static ZONE_MUTATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let counter = CounterVec::new(
        Opts::new(
            format!("{METRICS_NAMESPACE}_zone_mutations_total"),
            "Replica zone mutations by operation",
        ),
        &["operation"],
    )
    .expect("valid metric definition");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

/// Time spent waiting to acquire the sync lock
pub static GATE_WAIT_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{METRICS_NAMESPACE}_gate_wait_seconds"),
            "Time spent waiting to acquire the sync lock",
        )
        .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0]),
    )
    .expect("valid metric definition");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("metric registered once");
    histogram
});

/// Time the sync lock is held per operation
pub static GATE_HOLD_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{METRICS_NAMESPACE}_gate_hold_seconds"),
            "Time the sync lock is held per operation",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0]),
    )
    .expect("valid metric definition");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("metric registered once");
    histogram
});

/// Record a completed sync attempt.
pub fn record_sync(trigger: &str, outcome: &str) {
    SYNC_TOTAL.with_label_values(&[trigger, outcome]).inc();
}

/// Record a replica zone mutation.
pub fn record_zone_mutation(operation: &str) {
    ZONE_MUTATIONS_TOTAL.with_label_values(&[operation]).inc();
}

/// Observe a gate acquisition wait.
pub fn observe_gate_wait(waited: Duration) {
    GATE_WAIT_SECONDS.observe(waited.as_secs_f64());
}

/// Observe a gate hold duration.
pub fn observe_gate_hold(held: Duration) {
    GATE_HOLD_SECONDS.observe(held.as_secs_f64());
}

/// Render the registry in Prometheus text exposition format.
///
/// # Errors
///
/// Returns an error when encoding fails (malformed metric state).
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
