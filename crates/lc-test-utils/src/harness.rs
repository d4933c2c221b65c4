//! Fully wired dispatcher over in-memory mocks.
//!
//! The cleanup registry mirrors the production order. Tasks whose production
//! implementation talks to Redis directly (block list, polls) and the file
//! purge are replaced by [`RecordingCleanupTask`]s; job-queue and speech tasks
//! are the real implementations over [`MockJobQueue`] / [`MockSpeechService`].

use crate::mock_collaborators::{
    MockAnalyticsSink, MockBus, MockJobQueue, MockRecorder, MockSpeechService,
    MockWebhookNotifier, RecordingCleanupTask,
};
use crate::mock_store::MockRoomStore;
use lifecycle_service::analytics::AnalyticsEmitter;
use lifecycle_service::cleanup::{
    AnalyticsExportTask, BreakoutClient, BreakoutTeardownTask, CleanupRegistry, JobQueue,
    SharedDocumentCleanupTask, SpeechFinalizeTask, SpeechService,
};
use lifecycle_service::clients::WebhookNotifier;
use lifecycle_service::dispatcher::EventDispatcher;
use lifecycle_service::events::LifecycleEvent;
use lifecycle_service::fanout::FanOut;
use lifecycle_service::presence::{ParticipantPresenceTracker, ServiceIdentities};
use lifecycle_service::rooms::RoomLifecycleCoordinator;
use lifecycle_service::watchdog::DurationWatchdog;
use std::sync::Arc;

/// Builder for [`TestHarness`].
#[derive(Debug, Clone)]
pub struct TestHarnessBuilder {
    keep_uploads: bool,
    webhook_enabled: bool,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            keep_uploads: false,
            webhook_enabled: true,
        }
    }
}

impl TestHarnessBuilder {
    /// Retain uploads: no file purge task is registered.
    #[must_use]
    pub fn keep_uploads(mut self) -> Self {
        self.keep_uploads = true;
        self
    }

    /// No outbound webhook configured.
    #[must_use]
    pub fn without_webhook(mut self) -> Self {
        self.webhook_enabled = false;
        self
    }

    #[must_use]
    pub fn build(self) -> TestHarness {
        let store = MockRoomStore::new();
        let bus = MockBus::new();
        let recorder = MockRecorder::new();
        let analytics = MockAnalyticsSink::new();
        let webhook = MockWebhookNotifier::new();
        let jobs = MockJobQueue::new();
        let speech = MockSpeechService::new();
        let file_purge = RecordingCleanupTask::new("file_purge");
        let blocklist = RecordingCleanupTask::new("blocklist_clear");
        let polls = RecordingCleanupTask::new("poll_clear");
        let watchdog = DurationWatchdog::new();
        let fanout = FanOut::new();
        let identities = ServiceIdentities::new(["RECORDER_BOT", "RTMP_BOT"]);

        let job_queue: Arc<dyn JobQueue> = Arc::new(jobs.clone());
        let speech_service: Arc<dyn SpeechService> = Arc::new(speech.clone());
        let breakout = Arc::new(BreakoutClient::new(Arc::clone(&job_queue)));

        let mut cleanup = CleanupRegistry::new();
        if !self.keep_uploads {
            cleanup = cleanup.with_task(Arc::new(file_purge.clone()));
        }
        let cleanup = cleanup
            .with_task(Arc::new(SharedDocumentCleanupTask::new(Arc::clone(
                &job_queue,
            ))))
            .with_task(Arc::new(blocklist.clone()))
            .with_task(Arc::new(polls.clone()))
            .with_task(Arc::new(BreakoutTeardownTask::new(Arc::clone(&breakout))))
            .with_task(Arc::new(SpeechFinalizeTask::new(Arc::clone(
                &speech_service,
            ))))
            .with_task(Arc::new(AnalyticsExportTask::new(job_queue)));

        let rooms = Arc::new(RoomLifecycleCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Arc::new(recorder.clone()),
            breakout,
            cleanup,
            watchdog.clone(),
            fanout.clone(),
        ));
        let presence = Arc::new(ParticipantPresenceTracker::new(
            Arc::new(store.clone()),
            speech_service,
            identities.clone(),
            fanout.clone(),
        ));
        let emitter = AnalyticsEmitter::new(Arc::new(analytics.clone()), identities);
        let notifier: Arc<dyn WebhookNotifier> = Arc::new(webhook.clone());
        let notifier = self.webhook_enabled.then_some(notifier);
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&rooms),
            Arc::clone(&presence),
            emitter,
            notifier,
            fanout.clone(),
        ));

        TestHarness {
            store,
            bus,
            recorder,
            analytics,
            webhook,
            jobs,
            speech,
            file_purge,
            blocklist,
            polls,
            watchdog,
            fanout,
            rooms,
            presence,
            dispatcher,
        }
    }
}

/// Dispatcher plus handles on every mock behind it.
pub struct TestHarness {
    pub store: MockRoomStore,
    pub bus: MockBus,
    pub recorder: MockRecorder,
    pub analytics: MockAnalyticsSink,
    pub webhook: MockWebhookNotifier,
    pub jobs: MockJobQueue,
    pub speech: MockSpeechService,
    pub file_purge: RecordingCleanupTask,
    pub blocklist: RecordingCleanupTask,
    pub polls: RecordingCleanupTask,
    pub watchdog: DurationWatchdog,
    pub fanout: FanOut,
    pub rooms: Arc<RoomLifecycleCoordinator>,
    pub presence: Arc<ParticipantPresenceTracker>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    #[must_use]
    pub fn new() -> Self {
        TestHarnessBuilder::default().build()
    }

    #[must_use]
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// Dispatch and wait for every fan-out task to finish.
    pub async fn dispatch(&self, event: LifecycleEvent) {
        self.dispatcher.dispatch(event).await;
        self.settle().await;
    }

    /// Wait for in-flight fan-out tasks.
    pub async fn settle(&self) {
        self.fanout.drain().await;
    }
}
