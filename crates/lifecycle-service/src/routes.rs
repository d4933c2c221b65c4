//! HTTP routes for the Lifecycle Service.
//!
//! One listener serves webhook ingress and the operational endpoints:
//!
//! - `POST /webhook` - Lifecycle event from the media server
//! - `GET /health`, `GET /ready` - Probes
//! - `GET /metrics` - Prometheus scrape

use crate::dispatcher::EventDispatcher;
use crate::events::LifecycleEvent;
use crate::observability::{health_router, HealthState};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;

/// Application state shared across webhook handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<EventDispatcher>,
}

/// Build the application routes.
///
/// `metrics` is `None` in tests, where no global recorder is installed.
pub fn build_routes(
    state: Arc<AppState>,
    health_state: Arc<HealthState>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let mut app = Router::new()
        .route("/webhook", post(webhook_handler))
        .with_state(state)
        .merge(health_router(health_state));

    if let Some(handle) = metrics {
        app = app.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    app.layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

/// Handler for POST /webhook
///
/// Answers once the synchronous portion of dispatch is done. Any parseable
/// body gets `200 OK`; the media server does not act on the response.
#[tracing::instrument(skip_all, name = "lc.webhook.ingress")]
async fn webhook_handler(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let event = match LifecycleEvent::from_json(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(target: "lc.dispatcher", error = %e, "Rejected unparseable webhook body");
            return StatusCode::BAD_REQUEST;
        }
    };

    state.dispatcher.dispatch(event).await;
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
