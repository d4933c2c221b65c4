//! Health endpoints for the Lifecycle Service
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (can we accept webhooks?)
//!
//! Readiness only tracks the webhook path (Redis connected, listener bound).
//! The watchdog control subscription is reported in the `/ready` body but does
//! not gate traffic: a missing subscription only delays watchdog removal on
//! peer instances.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the Lifecycle Service.
#[derive(Debug)]
pub struct HealthState {
    live: AtomicBool,
    ready: AtomicBool,
    watchdog_subscribed: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            watchdog_subscribed: AtomicBool::new(false),
        }
    }

    /// Mark the service as ready to accept webhooks.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service as not ready (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Record whether the watchdog control subscription is active.
    pub fn set_watchdog_subscribed(&self, subscribed: bool) {
        self.watchdog_subscribed.store(subscribed, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_watchdog_subscribed(&self) -> bool {
        self.watchdog_subscribed.load(Ordering::SeqCst)
    }
}

/// Body of the readiness probe.
#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub watchdog_subscribed: bool,
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<ReadinessReport>) {
    let report = ReadinessReport {
        ready: state.is_ready(),
        watchdog_subscribed: state.is_watchdog_subscribed(),
    };
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
