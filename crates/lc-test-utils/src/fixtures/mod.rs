//! Pre-configured test data fixtures for Lifecycle Service testing.
//!
//! Provides builders for rooms, participants and the six lifecycle events.
//! Events are built by serializing a webhook JSON body and parsing it, so
//! fixtures exercise the same decoding path as real deliveries.

use lifecycle_service::events::{LifecycleEvent, RoomDescriptor, TrackSource};
use serde_json::{json, Value};
use uuid::Uuid;

/// Test room fixture.
#[derive(Debug, Clone)]
pub struct TestRoom {
    /// Room id (room name).
    pub name: String,
    /// Session id.
    pub sid: String,
    /// Unix seconds.
    pub creation_time: i64,
    /// Metadata JSON (serialized into the opaque blob).
    pub metadata: Option<Value>,
}

impl TestRoom {
    /// Create a room with a random session id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sid: format!("RM_{}", Uuid::new_v4().simple()),
            creation_time: 1_706_000_000,
            metadata: None,
        }
    }

    /// Create a room with a random name.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("room-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = sid.into();
        self
    }

    #[must_use]
    pub fn with_creation_time(mut self, creation_time: i64) -> Self {
        self.creation_time = creation_time;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Declare a duration limit (minutes).
    #[must_use]
    pub fn with_duration(self, minutes: u64) -> Self {
        self.merge_metadata(json!({"room_features": {"room_duration": minutes}}))
    }

    /// Mark as a breakout room.
    #[must_use]
    pub fn breakout(self) -> Self {
        self.merge_metadata(json!({"is_breakout_room": true}))
    }

    /// Supply an external start time.
    #[must_use]
    pub fn started_at(self, unix_seconds: u64) -> Self {
        self.merge_metadata(json!({"started_at": unix_seconds}))
    }

    fn merge_metadata(mut self, patch: Value) -> Self {
        let mut metadata = self.metadata.take().unwrap_or_else(|| json!({}));
        if let (Some(target), Value::Object(patch)) = (metadata.as_object_mut(), patch) {
            for (key, value) in patch {
                if let (Some(Value::Object(existing)), Value::Object(more)) =
                    (target.get_mut(&key), &value)
                {
                    existing.extend(more.clone());
                    continue;
                }
                target.insert(key, value);
            }
        }
        self.metadata = Some(metadata);
        self
    }

    /// Metadata blob as the media server sends it.
    #[must_use]
    pub fn metadata_blob(&self) -> String {
        self.metadata
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default()
    }

    fn to_json(&self) -> Value {
        json!({
            "sid": self.sid,
            "name": self.name,
            "creationTime": self.creation_time.to_string(),
            "metadata": self.metadata_blob(),
        })
    }

    /// Parsed room descriptor.
    #[must_use]
    pub fn descriptor(&self) -> RoomDescriptor {
        serde_json::from_value(self.to_json()).unwrap()
    }
}

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    pub identity: String,
    pub name: String,
    pub metadata: String,
}

impl TestParticipant {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        Self {
            name: format!("User {identity}"),
            identity,
            metadata: String::new(),
        }
    }

    /// The recording bot.
    #[must_use]
    pub fn recorder_bot() -> Self {
        Self::new("RECORDER_BOT")
    }

    /// The broadcast relay bot.
    #[must_use]
    pub fn rtmp_bot() -> Self {
        Self::new("RTMP_BOT")
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    fn to_json(&self) -> Value {
        json!({
            "sid": format!("PA_{}", self.identity),
            "identity": self.identity,
            "name": self.name,
            "metadata": self.metadata,
        })
    }
}

fn track_source_tag(source: TrackSource) -> &'static str {
    match source {
        TrackSource::Microphone => "MICROPHONE",
        TrackSource::Camera => "CAMERA",
        TrackSource::ScreenShare => "SCREEN_SHARE",
        TrackSource::ScreenShareAudio => "SCREEN_SHARE_AUDIO",
        TrackSource::Other => "UNKNOWN",
    }
}

fn parse(body: &Value) -> LifecycleEvent {
    LifecycleEvent::from_json(body.to_string().as_bytes()).unwrap()
}

fn base(kind: &str, room: &TestRoom) -> Value {
    json!({
        "event": kind,
        "id": format!("EV_{}", Uuid::new_v4().simple()),
        "createdAt": "1706000100",
        "room": room.to_json(),
    })
}

#[must_use]
pub fn room_started(room: &TestRoom) -> LifecycleEvent {
    parse(&base("room_started", room))
}

#[must_use]
pub fn room_finished(room: &TestRoom) -> LifecycleEvent {
    parse(&base("room_finished", room))
}

fn with_participant(kind: &str, room: &TestRoom, participant: &TestParticipant) -> Value {
    let mut body = base(kind, room);
    body["participant"] = participant.to_json();
    body
}

#[must_use]
pub fn participant_joined(room: &TestRoom, participant: &TestParticipant) -> LifecycleEvent {
    parse(&with_participant("participant_joined", room, participant))
}

#[must_use]
pub fn participant_left(room: &TestRoom, participant: &TestParticipant) -> LifecycleEvent {
    parse(&with_participant("participant_left", room, participant))
}

fn track_event(
    kind: &str,
    room: &TestRoom,
    participant: &TestParticipant,
    source: TrackSource,
) -> LifecycleEvent {
    let mut body = with_participant(kind, room, participant);
    body["track"] = json!({"sid": "TR_1", "source": track_source_tag(source)});
    parse(&body)
}

#[must_use]
pub fn track_published(
    room: &TestRoom,
    participant: &TestParticipant,
    source: TrackSource,
) -> LifecycleEvent {
    track_event("track_published", room, participant, source)
}

#[must_use]
pub fn track_unpublished(
    room: &TestRoom,
    participant: &TestParticipant,
    source: TrackSource,
) -> LifecycleEvent {
    track_event("track_unpublished", room, participant, source)
}

/// Event of the given kind with no room descriptor.
#[must_use]
pub fn event_without_room(kind: &str) -> LifecycleEvent {
    parse(&json!({"event": kind, "id": "EV_noroom"}))
}

/// Event with a tag this service does not know.
#[must_use]
pub fn unrecognized_event(room: &TestRoom) -> LifecycleEvent {
    parse(&base("egress_started", room))
}
