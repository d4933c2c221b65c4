//! Room-scoped Redis state cleared at session end.
//!
//! Both keys are owned by other services and keyed by room id only, so they
//! are cleared whenever any session of the room finishes.

use super::{CleanupContext, CleanupTask};
use crate::errors::LcError;
use async_trait::async_trait;
use common::types::RoomId;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, instrument, warn};

#[must_use]
pub fn blocklist_key(room_id: &RoomId) -> String {
    format!("lc:room:{room_id}:blocklist")
}

#[must_use]
pub fn poll_keys(room_id: &RoomId) -> [String; 2] {
    [
        format!("lc:room:{room_id}:polls"),
        format!("lc:room:{room_id}:poll_responses"),
    ]
}

async fn delete_keys(
    connection: &MultiplexedConnection,
    task: &'static str,
    room_id: &RoomId,
    keys: &[String],
) -> Result<(), LcError> {
    let mut conn = connection.clone();
    let removed: i64 = conn.del(keys).await.map_err(|e| {
        warn!(target: "lc.cleanup", task = task, room_id = %room_id, error = %e, "Failed to delete keys");
        LcError::Redis(format!("{task} failed: {e}"))
    })?;
    debug!(target: "lc.cleanup", task = task, room_id = %room_id, removed = removed, "Deleted keys");
    Ok(())
}

/// Clears the user access block list of a room.
#[derive(Clone)]
pub struct BlockListClearTask {
    connection: MultiplexedConnection,
}

impl BlockListClearTask {
    #[must_use]
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl CleanupTask for BlockListClearTask {
    fn name(&self) -> &'static str {
        "blocklist_clear"
    }

    #[instrument(skip_all, fields(room_id = %ctx.room_id))]
    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        delete_keys(
            &self.connection,
            self.name(),
            &ctx.room_id,
            &[blocklist_key(&ctx.room_id)],
        )
        .await
    }
}

/// Clears polls and poll responses of a room.
#[derive(Clone)]
pub struct PollStateClearTask {
    connection: MultiplexedConnection,
}

impl PollStateClearTask {
    #[must_use]
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl CleanupTask for PollStateClearTask {
    fn name(&self) -> &'static str {
        "poll_clear"
    }

    #[instrument(skip_all, fields(room_id = %ctx.room_id))]
    async fn run(&self, ctx: &CleanupContext) -> Result<(), LcError> {
        delete_keys(
            &self.connection,
            self.name(),
            &ctx.room_id,
            &poll_keys(&ctx.room_id),
        )
        .await
    }
}
