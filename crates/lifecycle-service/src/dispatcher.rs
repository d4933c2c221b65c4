//! Event dispatcher.
//!
//! Single entry point for inbound lifecycle events. For every recognized kind
//! the dispatcher:
//!
//! 1. schedules the outbound webhook forward (skipped, with a log line, when
//!    the event has no usable room descriptor),
//! 2. schedules analytics emission,
//! 3. runs the kind's synchronous portion (room coordinator or presence
//!    tracker) and waits for it.
//!
//! Nothing is returned to the caller: the media server does not act on the
//! response, so failures end in logs and metrics.

use crate::analytics::AnalyticsEmitter;
use crate::clients::{WebhookEnvelope, WebhookNotifier};
use crate::errors::LcError;
use crate::events::{EventKind, LifecycleEvent, ParticipantDescriptor, RoomDescriptor};
use crate::fanout::FanOut;
use crate::observability::metrics;
use crate::presence::ParticipantPresenceTracker;
use crate::rooms::RoomLifecycleCoordinator;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct EventDispatcher {
    rooms: Arc<RoomLifecycleCoordinator>,
    presence: Arc<ParticipantPresenceTracker>,
    analytics: AnalyticsEmitter,
    /// `None` disables forwarding.
    webhook: Option<Arc<dyn WebhookNotifier>>,
    fanout: FanOut,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(
        rooms: Arc<RoomLifecycleCoordinator>,
        presence: Arc<ParticipantPresenceTracker>,
        analytics: AnalyticsEmitter,
        webhook: Option<Arc<dyn WebhookNotifier>>,
        fanout: FanOut,
    ) -> Self {
        Self {
            rooms,
            presence,
            analytics,
            webhook,
            fanout,
        }
    }

    /// Handle one event. Returns once the synchronous portion is done.
    #[instrument(skip_all, fields(kind = event.kind.as_str(), event_id = %event.id))]
    pub async fn dispatch(&self, event: LifecycleEvent) {
        metrics::record_event(event.kind.as_str());

        if event.kind == EventKind::Unrecognized {
            debug!(target: "lc.dispatcher", event_id = %event.id, "Ignoring unrecognized event kind");
            return;
        }

        let event = Arc::new(event);
        self.schedule_forward(&event);
        self.schedule_analytics(&event);

        if let Err(e) = self.run_synchronous(&event).await {
            warn!(
                target: "lc.dispatcher",
                kind = event.kind.as_str(),
                error = %e,
                error_type = e.kind(),
                "Event handling failed"
            );
        }
    }

    fn schedule_forward(&self, event: &Arc<LifecycleEvent>) {
        let Some(webhook) = &self.webhook else {
            return;
        };
        let envelope = match WebhookEnvelope::from_event(event) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    target: "lc.dispatcher",
                    kind = event.kind.as_str(),
                    error = %e,
                    "Not forwarding malformed event"
                );
                return;
            }
        };

        let webhook = Arc::clone(webhook);
        self.fanout.spawn("webhook_forward", async move {
            webhook.notify(envelope.session_id(), &envelope).await
        });
    }

    fn schedule_analytics(&self, event: &Arc<LifecycleEvent>) {
        let analytics = self.analytics.clone();
        let event = Arc::clone(event);
        self.fanout.spawn("analytics", async move {
            analytics.handle_event(&event).await;
            Ok(())
        });
    }

    async fn run_synchronous(&self, event: &LifecycleEvent) -> Result<(), LcError> {
        match event.kind {
            EventKind::RoomStarted => {
                let outcome = self.rooms.on_room_started(require_room(event)?).await?;
                debug!(target: "lc.dispatcher", ?outcome, "Room start handled");
            }
            EventKind::RoomFinished => {
                let outcome = self.rooms.on_room_finished(require_room(event)?).await?;
                debug!(target: "lc.dispatcher", ?outcome, "Room finish handled");
            }
            EventKind::ParticipantJoined => {
                let (room, participant) = require_participant(event)?;
                let outcome = self.presence.on_participant_joined(room, participant).await?;
                debug!(target: "lc.dispatcher", ?outcome, "Join handled");
            }
            EventKind::ParticipantLeft => {
                let (room, participant) = require_participant(event)?;
                let outcome = self.presence.on_participant_left(room, participant).await?;
                debug!(target: "lc.dispatcher", ?outcome, "Leave handled");
            }
            // Track changes only feed analytics
            EventKind::TrackPublished | EventKind::TrackUnpublished | EventKind::Unrecognized => {}
        }
        Ok(())
    }
}

fn require_room(event: &LifecycleEvent) -> Result<&RoomDescriptor, LcError> {
    event
        .room
        .as_ref()
        .ok_or_else(|| LcError::MalformedEvent("event has no room descriptor".to_string()))
}

fn require_participant(
    event: &LifecycleEvent,
) -> Result<(&RoomDescriptor, &ParticipantDescriptor), LcError> {
    let room = require_room(event)?;
    let participant = event.participant.as_ref().ok_or_else(|| {
        LcError::MalformedEvent("event has no participant descriptor".to_string())
    })?;
    Ok((room, participant))
}
