//! Metrics definitions for the Lifecycle Service per ADR-0011
//!
//! All metrics follow Prometheus naming conventions:
//! - `lc_` prefix for the Lifecycle Service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// ADR-0011: Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Fan-out tasks are single network round trips or small filesystem ops
        .set_buckets_for_metric(
            Matcher::Prefix("lc_fanout_task".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set fan-out task buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Record one inbound lifecycle event.
pub fn record_event(kind: &'static str) {
    counter!("lc_events_total", "kind" => kind).increment(1);
}

/// Record the outcome and latency of one fan-out task.
pub fn record_fanout_task(task: &'static str, status: &'static str, duration: Duration) {
    histogram!("lc_fanout_task_duration_seconds", "task" => task)
        .record(duration.as_secs_f64());
    counter!("lc_fanout_tasks_total", "task" => task, "status" => status).increment(1);
}

/// Record one room store call.
///
/// `status` is `success` when the record changed, `noop` when the store
/// declined (unknown room, stale session), `error` on transport failure.
pub fn record_store_operation(operation: &'static str, status: &'static str) {
    counter!("lc_store_operations_total", "operation" => operation, "status" => status)
        .increment(1);
}

/// Record a participant count that went below zero.
pub fn record_negative_participant_count() {
    counter!("lc_negative_participant_count_total").increment(1);
}

/// Set the number of duration watchdog entries held by this instance.
#[allow(clippy::cast_precision_loss)] // Entry counts are far below f64 precision limits
pub fn set_watchdog_entries(count: usize) {
    gauge!("lc_watchdog_entries").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_without_recorder() {
        // No recorder installed: every call must be a silent no-op
        record_event("room_started");
        record_fanout_task("recorder_stop", "success", Duration::from_millis(5));
        record_fanout_task("file_purge", "error", Duration::from_millis(50));
        record_store_operation("update_status", "noop");
        record_negative_participant_count();
        set_watchdog_entries(3);
    }

    #[test]
    fn test_metrics_are_captured_by_recorder() {
        use metrics_util::debugging::DebuggingRecorder;

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        // Metrics recorders are global state; run with a local recorder so
        // this test does not depend on install order.
        metrics::with_local_recorder(&recorder, || {
            record_event("room_finished");
            record_fanout_task("client_delete_room", "success", Duration::from_millis(2));
            record_store_operation("upsert_room", "success");
            record_negative_participant_count();
            set_watchdog_entries(1);
        });

        let metrics = snapshotter.snapshot().into_vec();
        assert!(
            metrics.len() >= 5,
            "Should have recorded at least 5 metrics, got {}",
            metrics.len()
        );
    }
}
