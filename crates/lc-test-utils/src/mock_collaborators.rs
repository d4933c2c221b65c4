//! Recording mocks for the fan-out collaborators.
//!
//! Every mock records its calls and can be switched to fail, so tests can
//! check both what was sent and that one failing collaborator leaves the
//! others untouched.

use async_trait::async_trait;
use common::types::{RoomId, SessionId};
use lifecycle_service::analytics::AnalyticsEvent;
use lifecycle_service::cleanup::{CleanupContext, CleanupTask, Job, JobQueue, SpeechService};
use lifecycle_service::clients::{
    AnalyticsSink, Channel, NotificationBus, NotificationMessage, RecorderControl, RecorderTask,
    WebhookEnvelope, WebhookNotifier,
};
use lifecycle_service::errors::LcError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared call log plus failure switch.
#[derive(Debug)]
struct Recorded<T> {
    calls: Arc<Mutex<Vec<T>>>,
    fail: Arc<AtomicBool>,
}

impl<T> Default for Recorded<T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<T> Clone for Recorded<T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
            fail: Arc::clone(&self.fail),
        }
    }
}

impl<T: Clone> Recorded<T> {
    /// Record the call, then fail if switched to failing.
    fn record(&self, service: &'static str, call: T) -> Result<(), LcError> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LcError::Collaborator {
                service,
                message: "mock failure".to_string(),
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<T> {
        self.calls.lock().unwrap().clone()
    }

    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

// ============================================================================
// Notification bus
// ============================================================================

#[derive(Clone, Default)]
pub struct MockBus {
    inner: Recorded<(Channel, NotificationMessage)>,
}

impl MockBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.set_failing(fail);
    }

    pub fn published(&self) -> Vec<(Channel, NotificationMessage)> {
        self.inner.calls()
    }

    /// Messages published on one channel.
    pub fn on(&self, channel: Channel) -> Vec<NotificationMessage> {
        self.published()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m)
            .collect()
    }
}

#[async_trait]
impl NotificationBus for MockBus {
    async fn publish(
        &self,
        channel: Channel,
        message: &NotificationMessage,
    ) -> Result<(), LcError> {
        self.inner.record("bus", (channel, message.clone()))
    }
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Clone, Default)]
pub struct MockRecorder {
    inner: Recorded<(RecorderTask, SessionId, RoomId)>,
}

impl MockRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.set_failing(fail);
    }

    pub fn commands(&self) -> Vec<(RecorderTask, SessionId, RoomId)> {
        self.inner.calls()
    }
}

#[async_trait]
impl RecorderControl for MockRecorder {
    async fn send_command(
        &self,
        task: RecorderTask,
        session_id: &SessionId,
        room_id: &RoomId,
    ) -> Result<(), LcError> {
        self.inner
            .record("recorder", (task, session_id.clone(), room_id.clone()))
    }
}

// ============================================================================
// Analytics sink
// ============================================================================

#[derive(Clone, Default)]
pub struct MockAnalyticsSink {
    inner: Recorded<AnalyticsEvent>,
}

impl MockAnalyticsSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.set_failing(fail);
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.inner.calls()
    }
}

#[async_trait]
impl AnalyticsSink for MockAnalyticsSink {
    async fn emit(&self, event: &AnalyticsEvent) -> Result<(), LcError> {
        self.inner.record("analytics", event.clone())
    }
}

// ============================================================================
// Outbound webhook
// ============================================================================

#[derive(Clone, Default)]
pub struct MockWebhookNotifier {
    inner: Recorded<(SessionId, WebhookEnvelope)>,
}

impl MockWebhookNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.set_failing(fail);
    }

    pub fn delivered(&self) -> Vec<(SessionId, WebhookEnvelope)> {
        self.inner.calls()
    }
}

#[async_trait]
impl WebhookNotifier for MockWebhookNotifier {
    async fn notify(
        &self,
        session_id: &SessionId,
        envelope: &WebhookEnvelope,
    ) -> Result<(), LcError> {
        self.inner
            .record("webhook", (session_id.clone(), envelope.clone()))
    }
}

// ============================================================================
// Job queue
// ============================================================================

#[derive(Clone, Default)]
pub struct MockJobQueue {
    inner: Recorded<(&'static str, Job)>,
}

impl MockJobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.set_failing(fail);
    }

    pub fn jobs(&self) -> Vec<(&'static str, Job)> {
        self.inner.calls()
    }

    /// `(service, action)` pairs, in enqueue order.
    pub fn actions(&self) -> Vec<(&'static str, String)> {
        self.jobs()
            .into_iter()
            .map(|(service, job)| (service, job.action))
            .collect()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(&self, service: &'static str, job: &Job) -> Result<(), LcError> {
        self.inner.record("jobs", (service, job.clone()))
    }
}

// ============================================================================
// Speech service
// ============================================================================

#[derive(Clone, Default)]
pub struct MockSpeechService {
    finalized: Recorded<(RoomId, SessionId)>,
    ended_users: Recorded<(RoomId, SessionId, String)>,
}

impl MockSpeechService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.finalized.set_failing(fail);
        self.ended_users.set_failing(fail);
    }

    pub fn finalized(&self) -> Vec<(RoomId, SessionId)> {
        self.finalized.calls()
    }

    pub fn ended_users(&self) -> Vec<(RoomId, SessionId, String)> {
        self.ended_users.calls()
    }
}

#[async_trait]
impl SpeechService for MockSpeechService {
    async fn finalize_room(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<bool, LcError> {
        self.finalized
            .record("speech", (room_id.clone(), session_id.clone()))?;
        Ok(true)
    }

    async fn end_user_session(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        user_id: &str,
    ) -> Result<u64, LcError> {
        self.ended_users.record(
            "speech",
            (room_id.clone(), session_id.clone(), user_id.to_string()),
        )?;
        Ok(0)
    }
}

// ============================================================================
// Cleanup task
// ============================================================================

/// Cleanup task that records every context it runs with.
#[derive(Clone)]
pub struct RecordingCleanupTask {
    name: &'static str,
    inner: Recorded<CleanupContext>,
}

impl RecordingCleanupTask {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Recorded::default(),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.set_failing(fail);
    }

    pub fn runs(&self) -> Vec<CleanupContext> {
        self.inner.calls()
    }
}

#[async_trait]
impl CleanupTask for RecordingCleanupTask {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        self.inner.record(self.name, ctx.clone())
    }
}
