//! Cleanup task registry.
//!
//! Finish-time teardown is a list of independent tasks. Each task receives the
//! same [`CleanupContext`], shares no state with its siblings, and runs as its
//! own fan-out task, so one failing collaborator never holds up or aborts
//! another.
//!
//! | Task | Collaborator |
//! |------|--------------|
//! | `file_purge` | Local upload directory (only when retention is disabled) |
//! | `shared_doc_cleanup` | Shared-document service (job queue) |
//! | `blocklist_clear` | Redis block list |
//! | `poll_clear` | Redis poll state |
//! | `breakout_teardown` | Breakout-room manager (job queue) |
//! | `speech_finalize` | Speech service usage record |
//! | `analytics_export` | Analytics exporter (job queue) |

pub mod files;
pub mod redis_state;
pub mod services;

pub use files::FilePurgeTask;
pub use redis_state::{BlockListClearTask, PollStateClearTask};
pub use services::{
    AnalyticsExportTask, BreakoutClient, BreakoutTeardownTask, Job, JobQueue, RedisJobQueue,
    RedisSpeechService, SharedDocumentCleanupTask, SpeechFinalizeTask, SpeechService,
};

use crate::errors::LcError;
use crate::fanout::FanOut;
use async_trait::async_trait;
use common::types::{RoomId, SessionId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Input shared by every cleanup task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupContext {
    pub room_id: RoomId,
    pub session_id: SessionId,
    /// Raw room metadata blob at finish time.
    pub metadata: String,
}

/// One room/session-scoped cleanup action.
#[async_trait]
pub trait CleanupTask: Send + Sync {
    /// Static task name, used as the fan-out metric label.
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError>;
}

/// Ordered set of cleanup tasks.
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    tasks: Vec<Arc<dyn CleanupTask>>,
}

impl CleanupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task.
    #[must_use]
    pub fn with_task(mut self, task: Arc<dyn CleanupTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Registered task names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn every task as its own fan-out task.
    pub fn schedule_all(&self, ctx: &CleanupContext, fanout: &FanOut) {
        for task in &self.tasks {
            let task = Arc::clone(task);
            let ctx = ctx.clone();
            debug!(
                target: "lc.cleanup",
                task = task.name(),
                room_id = %ctx.room_id,
                "Scheduling cleanup task"
            );
            fanout.spawn(task.name(), async move { task.run(&ctx).await });
        }
    }
}

/// Collaborators backing the production cleanup tasks.
#[derive(Clone)]
pub struct CleanupDependencies {
    pub connection: redis::aio::MultiplexedConnection,
    pub jobs: Arc<dyn JobQueue>,
    pub breakout: Arc<BreakoutClient>,
    pub speech: Arc<dyn SpeechService>,
    /// `None` when uploads are retained after the session ends.
    pub upload_dir: Option<PathBuf>,
}

/// Build the production registry.
#[must_use]
pub fn production_registry(deps: CleanupDependencies) -> CleanupRegistry {
    let mut registry = CleanupRegistry::new();
    if let Some(upload_dir) = deps.upload_dir {
        registry = registry.with_task(Arc::new(FilePurgeTask::new(upload_dir)));
    }
    registry
        .with_task(Arc::new(SharedDocumentCleanupTask::new(Arc::clone(&deps.jobs))))
        .with_task(Arc::new(BlockListClearTask::new(deps.connection.clone())))
        .with_task(Arc::new(PollStateClearTask::new(deps.connection)))
        .with_task(Arc::new(BreakoutTeardownTask::new(deps.breakout)))
        .with_task(Arc::new(SpeechFinalizeTask::new(deps.speech)))
        .with_task(Arc::new(AnalyticsExportTask::new(deps.jobs)))
}
