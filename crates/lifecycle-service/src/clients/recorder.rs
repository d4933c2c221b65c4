//! Recorder signal client.
//!
//! The recorder fleet listens on a Redis channel for start/stop commands.
//! Commands are idempotent on the recorder side: stopping a session that is
//! not being recorded is a no-op there.

use crate::errors::LcError;
use async_trait::async_trait;
use common::types::{RoomId, SessionId};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderTask {
    Start,
    Stop,
}

impl RecorderTask {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecorderTask::Start => "start",
            RecorderTask::Stop => "stop",
        }
    }
}

/// Wire format of one recorder command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderCommand {
    pub task: RecorderTask,
    pub session_id: SessionId,
    pub room_id: RoomId,
}

#[async_trait]
pub trait RecorderControl: Send + Sync {
    /// Send one command. Fire-and-forget.
    async fn send_command(
        &self,
        task: RecorderTask,
        session_id: &SessionId,
        room_id: &RoomId,
    ) -> Result<(), LcError>;
}

#[derive(Clone)]
pub struct RedisRecorderControl {
    connection: MultiplexedConnection,
    channel: String,
}

impl RedisRecorderControl {
    #[must_use]
    pub fn new(connection: MultiplexedConnection, channel: String) -> Self {
        Self {
            connection,
            channel,
        }
    }
}

#[async_trait]
impl RecorderControl for RedisRecorderControl {
    #[instrument(skip_all, fields(task = task.as_str(), room_id = %room_id, session_id = %session_id))]
    async fn send_command(
        &self,
        task: RecorderTask,
        session_id: &SessionId,
        room_id: &RoomId,
    ) -> Result<(), LcError> {
        let command = RecorderCommand {
            task,
            session_id: session_id.clone(),
            room_id: room_id.clone(),
        };
        let payload = serde_json::to_string(&command)?;
        let mut conn = self.connection.clone();

        let _: i64 = conn.publish(&self.channel, payload).await.map_err(|e| {
            warn!(
                target: "lc.recorder",
                error = %e,
                task = task.as_str(),
                room_id = %room_id,
                "Failed to send recorder command"
            );
            LcError::Redis(format!("Failed to send recorder command: {e}"))
        })?;

        debug!(target: "lc.recorder", task = task.as_str(), room_id = %room_id, "Sent recorder command");
        Ok(())
    }
}
