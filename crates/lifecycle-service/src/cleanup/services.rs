//! Cleanup clients for external services.
//!
//! The shared-document service, breakout-room manager and analytics exporter
//! consume jobs from per-service Redis lists (`lc:jobs:{service}`). Enqueueing
//! is the whole contract from our side: the owning service makes the job
//! idempotent.
//!
//! The speech service keeps its usage record in Redis (`lc:speech:{room_id}`),
//! which we finalize directly with a session-guarded script.

use super::{CleanupContext, CleanupTask};
use crate::clients::lua_scripts;
use crate::errors::LcError;
use async_trait::async_trait;
use common::types::{RoomId, SessionId};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Job queue service name of the shared-document service.
pub const SHARED_DOC_SERVICE: &str = "shared_doc";

/// Job queue service name of the breakout-room manager.
pub const BREAKOUT_SERVICE: &str = "breakout";

/// Job queue service name of the analytics exporter.
pub const ANALYTICS_EXPORT_SERVICE: &str = "analytics_export";

#[must_use]
pub fn job_queue_key(service: &str) -> String {
    format!("lc:jobs:{service}")
}

#[must_use]
pub fn speech_key(room_id: &RoomId) -> String {
    format!("lc:speech:{room_id}")
}

/// One queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub action: String,
    pub room_id: RoomId,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
    /// Unix seconds.
    pub requested_at: i64,
}

impl Job {
    #[must_use]
    pub fn new(action: &str, room_id: &RoomId, session_id: &SessionId) -> Self {
        Self {
            action: action.to_string(),
            room_id: room_id.clone(),
            session_id: session_id.clone(),
            metadata: String::new(),
            requested_at: chrono::Utc::now().timestamp(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: &str) -> Self {
        self.metadata = metadata.to_string();
        self
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, service: &'static str, job: &Job) -> Result<(), LcError>;
}

#[derive(Clone)]
pub struct RedisJobQueue {
    connection: MultiplexedConnection,
}

impl RedisJobQueue {
    #[must_use]
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    #[instrument(skip_all, fields(service = service, action = %job.action, room_id = %job.room_id))]
    async fn enqueue(&self, service: &'static str, job: &Job) -> Result<(), LcError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.connection.clone();
        let depth: i64 = conn
            .rpush(job_queue_key(service), payload)
            .await
            .map_err(|e| {
                warn!(target: "lc.cleanup", service = service, error = %e, "Failed to enqueue job");
                LcError::Collaborator {
                    service,
                    message: format!("enqueue failed: {e}"),
                }
            })?;
        debug!(target: "lc.cleanup", service = service, depth = depth, "Enqueued job");
        Ok(())
    }
}

/// Tears down the shared document of a room.
pub struct SharedDocumentCleanupTask {
    jobs: Arc<dyn JobQueue>,
}

impl SharedDocumentCleanupTask {
    #[must_use]
    pub fn new(jobs: Arc<dyn JobQueue>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl CleanupTask for SharedDocumentCleanupTask {
    fn name(&self) -> &'static str {
        "shared_doc_cleanup"
    }

    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        let job = Job::new("cleanup", &ctx.room_id, &ctx.session_id).with_metadata(&ctx.metadata);
        self.jobs.enqueue(SHARED_DOC_SERVICE, &job).await
    }
}

/// Breakout-room manager hooks.
pub struct BreakoutClient {
    jobs: Arc<dyn JobQueue>,
}

impl BreakoutClient {
    #[must_use]
    pub fn new(jobs: Arc<dyn JobQueue>) -> Self {
        Self { jobs }
    }

    /// Notify the manager that a breakout room has started.
    ///
    /// # Errors
    ///
    /// Returns `LcError::Collaborator` if the job cannot be queued.
    pub async fn after_start(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        metadata: &str,
    ) -> Result<(), LcError> {
        let job = Job::new("after_start", room_id, session_id).with_metadata(metadata);
        self.jobs.enqueue(BREAKOUT_SERVICE, &job).await
    }

    /// Tear down breakout state owned by a room.
    ///
    /// # Errors
    ///
    /// Returns `LcError::Collaborator` if the job cannot be queued.
    pub async fn teardown(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        metadata: &str,
    ) -> Result<(), LcError> {
        let job = Job::new("teardown", room_id, session_id).with_metadata(metadata);
        self.jobs.enqueue(BREAKOUT_SERVICE, &job).await
    }
}

pub struct BreakoutTeardownTask {
    breakout: Arc<BreakoutClient>,
}

impl BreakoutTeardownTask {
    #[must_use]
    pub fn new(breakout: Arc<BreakoutClient>) -> Self {
        Self { breakout }
    }
}

#[async_trait]
impl CleanupTask for BreakoutTeardownTask {
    fn name(&self) -> &'static str {
        "breakout_teardown"
    }

    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        self.breakout
            .teardown(&ctx.room_id, &ctx.session_id, &ctx.metadata)
            .await
    }
}

/// Triggers the analytics export for the finished session.
pub struct AnalyticsExportTask {
    jobs: Arc<dyn JobQueue>,
}

impl AnalyticsExportTask {
    #[must_use]
    pub fn new(jobs: Arc<dyn JobQueue>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl CleanupTask for AnalyticsExportTask {
    fn name(&self) -> &'static str {
        "analytics_export"
    }

    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        let job = Job::new("export", &ctx.room_id, &ctx.session_id).with_metadata(&ctx.metadata);
        self.jobs.enqueue(ANALYTICS_EXPORT_SERVICE, &job).await
    }
}

/// Speech-transcription usage accounting.
///
/// Both operations compare the stored session id: a room id may be reused by
/// a later session, whose usage must not be closed by a stale event.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Close usage accounting for a finished session. Returns true if a
    /// matching usage record was finalized.
    async fn finalize_room(&self, room_id: &RoomId, session_id: &SessionId)
        -> Result<bool, LcError>;

    /// Close one participant's open transcription session. Returns the
    /// seconds of usage added.
    async fn end_user_session(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        user_id: &str,
    ) -> Result<u64, LcError>;
}

#[derive(Clone)]
pub struct RedisSpeechService {
    connection: MultiplexedConnection,
    finalize_script: Script,
    end_user_script: Script,
}

impl RedisSpeechService {
    #[must_use]
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            finalize_script: Script::new(lua_scripts::FINALIZE_SPEECH),
            end_user_script: Script::new(lua_scripts::END_SPEECH_USER),
        }
    }
}

fn speech_error(e: &redis::RedisError, room_id: &RoomId) -> LcError {
    warn!(target: "lc.cleanup", room_id = %room_id, error = %e, "Speech service update failed");
    LcError::Collaborator {
        service: "speech",
        message: e.to_string(),
    }
}

#[async_trait]
impl SpeechService for RedisSpeechService {
    #[instrument(skip_all, fields(room_id = %room_id, session_id = %session_id))]
    async fn finalize_room(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<bool, LcError> {
        let mut conn = self.connection.clone();
        let result: i64 = self
            .finalize_script
            .key(speech_key(room_id))
            .arg(session_id.as_str())
            .arg(chrono::Utc::now().timestamp())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| speech_error(&e, room_id))?;
        Ok(result == 1)
    }

    #[instrument(skip_all, fields(room_id = %room_id, session_id = %session_id))]
    async fn end_user_session(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        user_id: &str,
    ) -> Result<u64, LcError> {
        let mut conn = self.connection.clone();
        let used: i64 = self
            .end_user_script
            .key(speech_key(room_id))
            .arg(session_id.as_str())
            .arg(user_id)
            .arg(chrono::Utc::now().timestamp())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| speech_error(&e, room_id))?;
        Ok(u64::try_from(used).unwrap_or(0))
    }
}

pub struct SpeechFinalizeTask {
    speech: Arc<dyn SpeechService>,
}

impl SpeechFinalizeTask {
    #[must_use]
    pub fn new(speech: Arc<dyn SpeechService>) -> Self {
        Self { speech }
    }
}

#[async_trait]
impl CleanupTask for SpeechFinalizeTask {
    fn name(&self) -> &'static str {
        "speech_finalize"
    }

    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        let finalized = self
            .speech
            .finalize_room(&ctx.room_id, &ctx.session_id)
            .await?;
        if finalized {
            info!(target: "lc.cleanup", room_id = %ctx.room_id, "Finalized speech usage");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<(&'static str, Job)>>,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, service: &'static str, job: &Job) -> Result<(), LcError> {
            self.jobs.lock().unwrap().push((service, job.clone()));
            Ok(())
        }
    }

    fn ctx() -> CleanupContext {
        CleanupContext {
            room_id: RoomId::new("standup").unwrap(),
            session_id: SessionId::new("RM_1"),
            metadata: r#"{"room_title":"Weekly"}"#.to_string(),
        }
    }

    #[test]
    fn test_key_layout() {
        let room = RoomId::new("standup").unwrap();
        assert_eq!(job_queue_key(BREAKOUT_SERVICE), "lc:jobs:breakout");
        assert_eq!(speech_key(&room), "lc:speech:standup");
    }

    #[tokio::test]
    async fn test_job_tasks_target_their_service() {
        let queue = Arc::new(RecordingQueue::default());
        let jobs: Arc<dyn JobQueue> = queue.clone();
        let breakout = Arc::new(BreakoutClient::new(Arc::clone(&jobs)));

        SharedDocumentCleanupTask::new(Arc::clone(&jobs))
            .run(&ctx())
            .await
            .unwrap();
        BreakoutTeardownTask::new(breakout).run(&ctx()).await.unwrap();
        AnalyticsExportTask::new(jobs).run(&ctx()).await.unwrap();

        let recorded = queue.jobs.lock().unwrap();
        let services: Vec<_> = recorded.iter().map(|(s, j)| (*s, j.action.as_str())).collect();
        assert_eq!(
            services,
            vec![
                (SHARED_DOC_SERVICE, "cleanup"),
                (BREAKOUT_SERVICE, "teardown"),
                (ANALYTICS_EXPORT_SERVICE, "export"),
            ]
        );
        for (service, job) in recorded.iter() {
            assert_eq!(job.session_id.as_str(), "RM_1", "{service}");
            assert!(job.metadata.contains("Weekly"), "{service}");
        }
    }

    #[test]
    fn test_job_wire_format_omits_empty_metadata() {
        let job = Job::new(
            "teardown",
            &RoomId::new("standup").unwrap(),
            &SessionId::new("RM_1"),
        );
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["action"], "teardown");
        assert!(json.get("metadata").is_none());
    }
}
