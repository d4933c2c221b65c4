//! Best-effort background task executor.
//!
//! Every side effect that must not block the dispatcher (recorder signal,
//! notifications, cleanup, analytics, outbound webhook) is submitted here as
//! an independent task. Each task owns its failure domain: an error is logged
//! with the task name and counted, and never reaches the dispatcher or a
//! sibling task. There is no retry and no cancellation of a started task.
//!
//! # Shutdown
//!
//! [`FanOut::drain`] waits for all in-flight tasks. The tracker is reopened
//! afterwards so tests can drain between dispatches.

use crate::errors::LcError;
use crate::observability::metrics;
use std::future::Future;
use std::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn, Instrument};

/// Cheaply cloneable handle to the shared task tracker.
#[derive(Clone, Default)]
pub struct FanOut {
    tracker: TaskTracker,
}

impl FanOut {
    /// Create an executor with an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Spawn an independent best-effort task.
    ///
    /// `task` must be a bounded, static label (it becomes a metric label).
    pub fn spawn<F>(&self, task: &'static str, fut: F)
    where
        F: Future<Output = Result<(), LcError>> + Send + 'static,
    {
        let span = tracing::debug_span!("lc.fanout.task", task = task);
        self.tracker.spawn(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                match result {
                    Ok(()) => {
                        debug!(target: "lc.fanout", task = task, "Task completed");
                        metrics::record_fanout_task(task, "success", elapsed);
                    }
                    Err(e) => {
                        warn!(
                            target: "lc.fanout",
                            task = task,
                            error = %e,
                            error_type = e.kind(),
                            "Task failed"
                        );
                        metrics::record_fanout_task(task, "error", elapsed);
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Number of tasks still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every spawned task to finish, then accept new tasks again.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
