//! Observability module for the Lifecycle Service
//!
//! Implements metrics and instrumentation per ADR-0011 (Observability Framework).
//!
//! # Privacy by Default
//!
//! Async operations use `#[instrument(skip_all)]` with explicit safe fields
//! (room id, session id). Participant display names and metadata blobs are
//! never logged. Metric labels are bounded:
//! - `kind`: 7 values (six event kinds plus `unrecognized`)
//! - `task`: bounded by the fan-out task names in code (~15 values)
//! - `operation`: bounded by room store operations (5 values)
//! - `status`: `success` / `error` / `noop`
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `lc_events_total` | Counter | `kind` | Inbound lifecycle events |
//! | `lc_fanout_tasks_total` | Counter | `task`, `status` | Background side-effect outcomes |
//! | `lc_fanout_task_duration_seconds` | Histogram | `task` | Side-effect latency |
//! | `lc_store_operations_total` | Counter | `operation`, `status` | Room record store calls |
//! | `lc_negative_participant_count_total` | Counter | none | Upstream join/leave inconsistencies |
//! | `lc_watchdog_entries` | Gauge | none | Rooms with a duration limit on this instance |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_event, record_fanout_task, record_negative_participant_count,
    record_store_operation, set_watchdog_entries,
};
