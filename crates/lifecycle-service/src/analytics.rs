//! Analytics event emitter.
//!
//! Maps lifecycle events onto the canonical analytics schema and hands them to
//! an [`AnalyticsSink`]. Two shapes share one entity:
//!
//! - Occurrence events (join/leave) carry no status value and are appended to
//!   an immutable per-room log.
//! - Status events (mic/webcam/screen share) carry a status value and
//!   overwrite a per-room/per-user/per-metric slot (last write wins).
//!
//! Mapping is pure; only [`AnalyticsEmitter::handle_event`] touches the sink,
//! and it never fails its caller.

use crate::clients::AnalyticsSink;
use crate::events::{EventKind, LifecycleEvent, TrackSource};
use crate::presence::ServiceIdentities;
use common::types::RoomId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Status value for a track that became active.
pub const STATUS_STARTED: &str = "started";

/// Status value for a track that stopped.
pub const STATUS_ENDED: &str = "ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventType {
    Room,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventName {
    UserJoined,
    UserLeft,
    MicStatus,
    WebcamStatus,
    ScreenShareStatus,
}

impl AnalyticsEventName {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AnalyticsEventName::UserJoined => "user_joined",
            AnalyticsEventName::UserLeft => "user_left",
            AnalyticsEventName::MicStatus => "mic_status",
            AnalyticsEventName::WebcamStatus => "webcam_status",
            AnalyticsEventName::ScreenShareStatus => "screen_share_status",
        }
    }
}

/// One analytics record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_type: AnalyticsEventType,
    pub event_name: AnalyticsEventName,
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
    /// Present for slot (upsert) events, absent for occurrence (append) events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_value: Option<String>,
    /// Unix seconds.
    pub time: i64,
}

impl AnalyticsEvent {
    /// True if this event overwrites a status slot rather than appending.
    #[must_use]
    pub fn is_status(&self) -> bool {
        self.status_value.is_some()
    }
}

/// Map a track change to its status metric.
///
/// Returns `None` for sources with no analytics metric.
#[must_use]
pub fn track_status(
    source: TrackSource,
    published: bool,
) -> Option<(AnalyticsEventName, &'static str)> {
    let name = match source {
        TrackSource::Microphone => AnalyticsEventName::MicStatus,
        TrackSource::Camera => AnalyticsEventName::WebcamStatus,
        TrackSource::ScreenShare | TrackSource::ScreenShareAudio => {
            AnalyticsEventName::ScreenShareStatus
        }
        TrackSource::Other => return None,
    };
    Some((name, if published { STATUS_STARTED } else { STATUS_ENDED }))
}

/// Map a lifecycle event to its analytics record, if it has one.
///
/// Room events, service participants, events without a room or participant,
/// and unmapped track sources yield `None`.
#[must_use]
pub fn map_event(
    event: &LifecycleEvent,
    service_identities: &ServiceIdentities,
    now: i64,
) -> Option<AnalyticsEvent> {
    let room_id = event.room.as_ref()?.room_id().ok()?;
    let participant = event.participant.as_ref()?;
    let time = if event.created_at > 0 {
        event.created_at
    } else {
        now
    };

    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    let base = |event_type, event_name| AnalyticsEvent {
        event_type,
        event_name,
        room_id: room_id.clone(),
        user_id: non_empty(&participant.identity),
        user_name: None,
        extra_data: None,
        status_value: None,
        time,
    };

    match event.kind {
        EventKind::ParticipantJoined | EventKind::ParticipantLeft
            if service_identities.contains(&participant.identity) =>
        {
            None
        }
        EventKind::ParticipantJoined => Some(AnalyticsEvent {
            user_name: non_empty(&participant.name),
            extra_data: non_empty(&participant.metadata),
            ..base(AnalyticsEventType::Room, AnalyticsEventName::UserJoined)
        }),
        EventKind::ParticipantLeft => {
            Some(base(AnalyticsEventType::User, AnalyticsEventName::UserLeft))
        }
        EventKind::TrackPublished | EventKind::TrackUnpublished => {
            let source = event.track.as_ref()?.source;
            let published = event.kind == EventKind::TrackPublished;
            let (name, status) = track_status(source, published)?;
            Some(AnalyticsEvent {
                status_value: Some(status.to_string()),
                ..base(AnalyticsEventType::User, name)
            })
        }
        EventKind::RoomStarted | EventKind::RoomFinished | EventKind::Unrecognized => None,
    }
}

/// Emits analytics for lifecycle events.
#[derive(Clone)]
pub struct AnalyticsEmitter {
    sink: Arc<dyn AnalyticsSink>,
    service_identities: ServiceIdentities,
}

impl AnalyticsEmitter {
    #[must_use]
    pub fn new(sink: Arc<dyn AnalyticsSink>, service_identities: ServiceIdentities) -> Self {
        Self {
            sink,
            service_identities,
        }
    }

    /// Map and emit. Sink failures are logged and swallowed.
    #[instrument(skip_all, fields(kind = event.kind.as_str()))]
    pub async fn handle_event(&self, event: &LifecycleEvent) {
        let now = chrono::Utc::now().timestamp();
        let Some(record) = map_event(event, &self.service_identities, now) else {
            return;
        };

        match self.sink.emit(&record).await {
            Ok(()) => debug!(
                target: "lc.analytics",
                room_id = %record.room_id,
                event_name = record.event_name.as_str(),
                "Analytics event emitted"
            ),
            Err(e) => warn!(
                target: "lc.analytics",
                room_id = %record.room_id,
                event_name = record.event_name.as_str(),
                error = %e,
                "Failed to emit analytics event"
            ),
        }
    }
}
