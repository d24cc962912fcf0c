//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define registry metrics (updates, conflicts, attachments, schema sync)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `registry_updates_total` (counter): operations by name and outcome
//! - `registry_update_duration_seconds` (histogram): operation latency
//! - `registry_version_conflicts_total` (counter): optimistic-concurrency retries
//! - `registry_update_queue_depth` (gauge): callers waiting for the mutation slot
//! - `registry_attachment_operations_total` (counter): generate/save/delete by `op`
//! - `registry_attachment_cleanup_failures_total` (counter): scratch files left behind
//! - `registry_schema_publications_total` (counter): distinct SDL values published
//! - `registry_schema_merge_failures_total` (counter): snapshots whose fragments failed to merge
//! - `registry_reconcile_actions_total` (counter): attachments regenerated or removed by `action`
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_update(operation: &str, outcome: &'static str, started: Instant) {
    counter!(
        "registry_updates_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("registry_update_duration_seconds", "operation" => operation.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_version_conflict() {
    counter!("registry_version_conflicts_total").increment(1);
}

pub fn set_update_queue_depth(depth: usize) {
    gauge!("registry_update_queue_depth").set(depth as f64);
}

pub fn record_attachment_operation(op: &'static str) {
    counter!("registry_attachment_operations_total", "op" => op).increment(1);
}

pub fn record_attachment_cleanup_failure() {
    counter!("registry_attachment_cleanup_failures_total").increment(1);
}

pub fn record_schema_publication() {
    counter!("registry_schema_publications_total").increment(1);
}

pub fn record_schema_merge_failure() {
    counter!("registry_schema_merge_failures_total").increment(1);
}

pub fn record_reconcile_action(action: &'static str) {
    counter!("registry_reconcile_actions_total", "action" => action).increment(1);
}
