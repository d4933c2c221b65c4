//! Inbound lifecycle events.
//!
//! The media server posts one JSON document per lifecycle change. Field names
//! are camelCase, enum values are SCREAMING_SNAKE_CASE, and 64-bit integers may
//! arrive either as JSON numbers or as decimal strings (protobuf JSON mapping).
//!
//! ```text
//! {
//!   "event": "participant_joined",
//!   "id": "EV_3kd9",
//!   "createdAt": "1706000000",
//!   "room": { "sid": "RM_x1", "name": "standup", "creationTime": "1705999990", "metadata": "{...}" },
//!   "participant": { "sid": "PA_p1", "identity": "alice", "name": "Alice", "metadata": "" },
//!   "track": { "sid": "TR_t1", "source": "CAMERA" }
//! }
//! ```

use crate::errors::LcError;
use common::types::{RoomId, SessionId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Lifecycle event kind.
///
/// Any tag not listed here deserializes to `Unrecognized` and is ignored by the
/// dispatcher, so new upstream event types never break ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RoomStarted,
    RoomFinished,
    ParticipantJoined,
    ParticipantLeft,
    TrackPublished,
    TrackUnpublished,
    #[default]
    #[serde(other)]
    Unrecognized,
}

impl EventKind {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::RoomStarted => "room_started",
            EventKind::RoomFinished => "room_finished",
            EventKind::ParticipantJoined => "participant_joined",
            EventKind::ParticipantLeft => "participant_left",
            EventKind::TrackPublished => "track_published",
            EventKind::TrackUnpublished => "track_unpublished",
            EventKind::Unrecognized => "unrecognized",
        }
    }
}

/// Room descriptor carried by every well-formed event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDescriptor {
    /// Media server session id (room SID).
    #[serde(default)]
    pub sid: SessionId,
    /// Room id (room name).
    #[serde(default)]
    pub name: String,
    /// Unix seconds at which the media server created the session.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub creation_time: i64,
    /// Opaque metadata blob (JSON encoded [`RoomMetadata`] when set by us).
    #[serde(default)]
    pub metadata: String,
}

impl RoomDescriptor {
    /// Validated room id.
    ///
    /// # Errors
    ///
    /// Returns `LcError::MalformedEvent` if the room name is blank.
    pub fn room_id(&self) -> Result<RoomId, LcError> {
        RoomId::new(self.name.clone()).map_err(LcError::from)
    }
}

/// Participant descriptor (participant and track events).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDescriptor {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: String,
}

/// Media source of a published track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    ScreenShareAudio,
    #[default]
    #[serde(other)]
    Other,
}

/// Track descriptor (track events).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub source: TrackSource,
}

/// One inbound lifecycle notification. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "event", default)]
    pub kind: EventKind,
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackDescriptor>,
}

impl LifecycleEvent {
    /// Parse a webhook body.
    ///
    /// # Errors
    ///
    /// Returns `LcError::Serialization` if the body is not a JSON object of the
    /// expected shape.
    pub fn from_json(body: &[u8]) -> Result<Self, LcError> {
        serde_json::from_slice(body).map_err(LcError::from)
    }
}

/// Feature flags stored in room metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomFeatures {
    /// Maximum session duration (minutes). Absent or 0 means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_duration: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoomFeatures {
    fn is_empty(&self) -> bool {
        self.room_duration.is_none() && self.extra.is_empty()
    }
}

/// Structured view of the room metadata blob.
///
/// Unknown keys survive a parse/serialize round trip, so stamping a field
/// never drops data written by other services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomMetadata {
    #[serde(default, skip_serializing_if = "RoomFeatures::is_empty")]
    pub room_features: RoomFeatures,
    /// Room was created by the breakout-room manager.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_breakout_room: bool,
    /// Unix seconds at which the session started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoomMetadata {
    /// Parse the metadata blob. An empty blob yields `None`.
    ///
    /// # Errors
    ///
    /// Returns `LcError::Serialization` if the blob is not valid JSON.
    pub fn parse(raw: &str) -> Result<Option<Self>, LcError> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(raw).map(Some).map_err(LcError::from)
    }

    /// Declared duration limit, if any.
    #[must_use]
    pub fn duration_limit(&self) -> Option<u64> {
        self.room_features.room_duration.filter(|d| *d > 0)
    }

    /// Serialize back to the metadata blob.
    ///
    /// # Errors
    ///
    /// Returns `LcError::Serialization` on encoding failure.
    pub fn to_json(&self) -> Result<String, LcError> {
        serde_json::to_string(self).map_err(LcError::from)
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(0),
        Some(NumberOrString::Number(n)) => Ok(n),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(0),
        Some(NumberOrString::String(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_participant_joined() {
        let body = br#"{
            "event": "participant_joined",
            "id": "EV_1",
            "createdAt": "1706000000",
            "room": {"sid": "RM_1", "name": "standup", "creationTime": "1705999990", "metadata": "", "numParticipants": 2},
            "participant": {"sid": "PA_1", "identity": "alice", "name": "Alice", "metadata": "{}"}
        }"#;

        let event = LifecycleEvent::from_json(body).unwrap();
        assert_eq!(event.kind, EventKind::ParticipantJoined);
        assert_eq!(event.created_at, 1_706_000_000);

        let room = event.room.as_ref().unwrap();
        assert_eq!(room.sid.as_str(), "RM_1");
        assert_eq!(room.creation_time, 1_705_999_990);
        assert_eq!(room.room_id().unwrap().as_str(), "standup");
        assert_eq!(event.participant.unwrap().identity, "alice");
        assert!(event.track.is_none());
    }

    #[test]
    fn test_numeric_timestamps_accepted() {
        let body = br#"{"event": "room_started", "createdAt": 12, "room": {"name": "r", "creationTime": 34}}"#;
        let event = LifecycleEvent::from_json(body).unwrap();
        assert_eq!(event.created_at, 12);
        assert_eq!(event.room.unwrap().creation_time, 34);
    }

    #[test]
    fn test_unknown_kind_is_unrecognized() {
        let event = LifecycleEvent::from_json(br#"{"event": "egress_started"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Unrecognized);

        let event = LifecycleEvent::from_json(br"{}").unwrap();
        assert_eq!(event.kind, EventKind::Unrecognized);
        assert!(event.room.is_none());
    }

    #[test]
    fn test_track_sources() {
        let parse = |s: &str| -> TrackSource {
            serde_json::from_str(&format!("\"{s}\"")).unwrap()
        };
        assert_eq!(parse("MICROPHONE"), TrackSource::Microphone);
        assert_eq!(parse("CAMERA"), TrackSource::Camera);
        assert_eq!(parse("SCREEN_SHARE"), TrackSource::ScreenShare);
        assert_eq!(parse("SCREEN_SHARE_AUDIO"), TrackSource::ScreenShareAudio);
        assert_eq!(parse("UNKNOWN"), TrackSource::Other);
    }

    #[test]
    fn test_blank_room_name_is_malformed() {
        let room = RoomDescriptor::default();
        assert!(matches!(room.room_id(), Err(LcError::MalformedEvent(_))));
    }

    #[test]
    fn test_room_metadata_preserves_unknown_keys() {
        let raw = r#"{"room_features":{"room_duration":600,"allow_webcams":true},"room_title":"Weekly"}"#;
        let mut meta = RoomMetadata::parse(raw).unwrap().unwrap();
        assert_eq!(meta.duration_limit(), Some(600));
        assert!(!meta.is_breakout_room);

        meta.started_at = Some(1_706_000_000);
        let value: Value = serde_json::from_str(&meta.to_json().unwrap()).unwrap();
        assert_eq!(value["room_title"], "Weekly");
        assert_eq!(value["room_features"]["allow_webcams"], true);
        assert_eq!(value["room_features"]["room_duration"], 600);
        assert_eq!(value["started_at"], 1_706_000_000);
    }

    #[test]
    fn test_room_metadata_empty_and_invalid() {
        assert!(RoomMetadata::parse("").unwrap().is_none());
        assert!(RoomMetadata::parse("not json").is_err());

        let meta = RoomMetadata::parse(r#"{"room_features":{"room_duration":0}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(meta.duration_limit(), None);
    }
}
