//! Notification bus publisher.
//!
//! Publish-only client for two logical channels. Delivery is fire-and-forget:
//! a successful `PUBLISH` says nothing about whether anyone was subscribed.

use crate::errors::LcError;
use async_trait::async_trait;
use common::types::{RoomId, SessionId};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

/// Type tag telling clients to evict local state of a finished room.
pub const DELETE_ROOM: &str = "deleteRoom";

/// Type tag telling watchdog instances to drop a room's entry.
pub const WATCHDOG_DELETE: &str = "delete";

/// Field naming the finishing session on a watchdog `delete` message.
pub const SESSION_ID_FIELD: &str = "sessionId";

/// Logical notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Client-facing broadcast (connected browsers via the websocket tier).
    Client,
    /// Internal duration-watchdog control.
    Watchdog,
}

impl Channel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::Client => "client",
            Channel::Watchdog => "watchdog",
        }
    }
}

/// Message published on a channel.
///
/// Serialized as `{"type": "...", "room_id": "...", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub room_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NotificationMessage {
    #[must_use]
    pub fn new(message_type: &str, room_id: &RoomId) -> Self {
        Self {
            message_type: message_type.to_string(),
            room_id: room_id.to_string(),
            fields: Map::new(),
        }
    }

    /// Client-facing "room is gone" broadcast.
    #[must_use]
    pub fn delete_room(room_id: &RoomId) -> Self {
        Self::new(DELETE_ROOM, room_id)
    }

    /// Internal watchdog removal for one session of a room.
    #[must_use]
    pub fn watchdog_delete(room_id: &RoomId, session_id: &SessionId) -> Self {
        let message = Self::new(WATCHDOG_DELETE, room_id);
        if session_id.is_empty() {
            message
        } else {
            message.with_field(SESSION_ID_FIELD, session_id.as_str())
        }
    }

    /// Attach an extra keyed field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Publish-only notification bus.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Publish one message. No acknowledgment is expected.
    async fn publish(&self, channel: Channel, message: &NotificationMessage)
        -> Result<(), LcError>;
}

/// Redis pub/sub publisher.
#[derive(Clone)]
pub struct RedisNotificationBus {
    connection: MultiplexedConnection,
    client_channel: String,
    watchdog_channel: String,
}

impl RedisNotificationBus {
    #[must_use]
    pub fn new(
        connection: MultiplexedConnection,
        client_channel: String,
        watchdog_channel: String,
    ) -> Self {
        Self {
            connection,
            client_channel,
            watchdog_channel,
        }
    }

    fn channel_name(&self, channel: Channel) -> &str {
        match channel {
            Channel::Client => &self.client_channel,
            Channel::Watchdog => &self.watchdog_channel,
        }
    }
}

#[async_trait]
impl NotificationBus for RedisNotificationBus {
    #[instrument(skip_all, fields(channel = channel.as_str(), message_type = %message.message_type))]
    async fn publish(
        &self,
        channel: Channel,
        message: &NotificationMessage,
    ) -> Result<(), LcError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.connection.clone();

        let receivers: i64 = conn
            .publish(self.channel_name(channel), payload)
            .await
            .map_err(|e| {
                warn!(
                    target: "lc.bus",
                    error = %e,
                    channel = channel.as_str(),
                    room_id = %message.room_id,
                    "Failed to publish notification"
                );
                LcError::Redis(format!("Failed to publish notification: {e}"))
            })?;

        debug!(
            target: "lc.bus",
            channel = channel.as_str(),
            room_id = %message.room_id,
            receivers = receivers,
            "Published notification"
        );
        Ok(())
    }
}
