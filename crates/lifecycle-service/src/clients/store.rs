//! Room record store.
//!
//! The store is the system of record for running/finished status. All
//! mutations are single-record atomic operations (Lua scripts), so concurrent
//! deliveries for the same room need no locking on our side.
//!
//! # Session Guard
//!
//! A room id may be reused by several sessions. Writes carry the session id
//! and the scripts refuse to touch a record that belongs to another session,
//! and `upsert_room` refuses to flip a finished session back to running.

use crate::clients::lua_scripts;
use crate::errors::LcError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{RoomId, SessionId};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Redis key of a room record.
#[must_use]
pub fn room_key(room_id: &RoomId) -> String {
    format!("lc:room:{room_id}")
}

/// Persisted room record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub session_id: SessionId,
    pub is_running: bool,
    /// Unix seconds reported by the media server.
    pub creation_time: i64,
    /// `creation_time` formatted to second precision (UTC).
    pub created: String,
    /// End time formatted to second precision, empty while running.
    pub ended: String,
    pub participants: i64,
    pub metadata: String,
}

/// Finish transition for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatusUpdate {
    pub room_id: RoomId,
    pub session_id: SessionId,
    /// End time formatted to second precision (UTC).
    pub ended: String,
}

/// Room record store operations.
///
/// Boolean results report whether the record changed; `false` is a
/// deliberate no-op (unknown room, other session, already finished), not an
/// error.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Create the record, or update it in place when `insert_only` is false.
    async fn upsert_room(&self, record: &RoomRecord, insert_only: bool) -> Result<bool, LcError>;

    /// Transition a running record to finished. Never inserts.
    async fn update_status(&self, update: &RoomStatusUpdate) -> Result<bool, LcError>;

    /// Atomically apply `delta` to the participant count.
    ///
    /// Returns the new count, or `None` if no matching record exists.
    async fn adjust_participant_count(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        delta: i64,
    ) -> Result<Option<i64>, LcError>;

    /// Replace the stored metadata blob for the current session.
    async fn update_metadata(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        metadata: &str,
    ) -> Result<bool, LcError>;

    /// Read the record for a room id.
    async fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, LcError>;
}

/// Redis-backed room store.
#[derive(Clone)]
pub struct RedisRoomStore {
    connection: MultiplexedConnection,
    upsert_script: Script,
    finish_script: Script,
    adjust_script: Script,
    metadata_script: Script,
}

impl RedisRoomStore {
    #[must_use]
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            upsert_script: Script::new(lua_scripts::UPSERT_ROOM),
            finish_script: Script::new(lua_scripts::FINISH_ROOM),
            adjust_script: Script::new(lua_scripts::ADJUST_PARTICIPANTS),
            metadata_script: Script::new(lua_scripts::UPDATE_METADATA),
        }
    }
}

fn redis_error(operation: &'static str, room_id: &RoomId, e: &redis::RedisError) -> LcError {
    warn!(
        target: "lc.redis.store",
        error = %e,
        room_id = %room_id,
        operation = operation,
        "Room store operation failed"
    );
    metrics::record_store_operation(operation, "error");
    LcError::Redis(format!("{operation} failed: {e}"))
}

fn record_outcome(operation: &'static str, changed: bool) -> bool {
    metrics::record_store_operation(operation, if changed { "success" } else { "noop" });
    changed
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    #[instrument(skip_all, fields(room_id = %record.room_id, session_id = %record.session_id))]
    async fn upsert_room(&self, record: &RoomRecord, insert_only: bool) -> Result<bool, LcError> {
        let mut conn = self.connection.clone();
        let result: i64 = self
            .upsert_script
            .key(room_key(&record.room_id))
            .arg(record.session_id.as_str())
            .arg(record.creation_time)
            .arg(&record.created)
            .arg(&record.metadata)
            .arg(if insert_only { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("upsert_room", &record.room_id, &e))?;

        if result < 0 {
            warn!(
                target: "lc.redis.store",
                room_id = %record.room_id,
                session_id = %record.session_id,
                "Refused start for a finished or superseded session"
            );
        } else {
            debug!(
                target: "lc.redis.store",
                room_id = %record.room_id,
                written = result == 1,
                "Upserted room record"
            );
        }
        Ok(record_outcome("upsert_room", result == 1))
    }

    #[instrument(skip_all, fields(room_id = %update.room_id, session_id = %update.session_id))]
    async fn update_status(&self, update: &RoomStatusUpdate) -> Result<bool, LcError> {
        let mut conn = self.connection.clone();
        let result: i64 = self
            .finish_script
            .key(room_key(&update.room_id))
            .arg(update.session_id.as_str())
            .arg(&update.ended)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("update_status", &update.room_id, &e))?;

        if result < 0 {
            warn!(
                target: "lc.redis.store",
                room_id = %update.room_id,
                session_id = %update.session_id,
                "Finish ignored, record belongs to another session"
            );
        }
        Ok(record_outcome("update_status", result == 1))
    }

    #[instrument(skip_all, fields(room_id = %room_id, delta = delta))]
    async fn adjust_participant_count(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        delta: i64,
    ) -> Result<Option<i64>, LcError> {
        let mut conn = self.connection.clone();
        let count: Option<i64> = self
            .adjust_script
            .key(room_key(room_id))
            .arg(session_id.as_str())
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("adjust_participants", room_id, &e))?;

        record_outcome("adjust_participants", count.is_some());
        Ok(count)
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn update_metadata(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        metadata: &str,
    ) -> Result<bool, LcError> {
        let mut conn = self.connection.clone();
        let result: i64 = self
            .metadata_script
            .key(room_key(room_id))
            .arg(session_id.as_str())
            .arg(metadata)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("update_metadata", room_id, &e))?;

        Ok(record_outcome("update_metadata", result == 1))
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, LcError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(room_key(room_id))
            .await
            .map_err(|e| redis_error("get_room", room_id, &e))?;

        Ok(record_from_fields(room_id.clone(), &fields))
    }
}

/// Build a record from `HGETALL` output. An empty hash means no record.
fn record_from_fields(room_id: RoomId, fields: &HashMap<String, String>) -> Option<RoomRecord> {
    if fields.is_empty() {
        return None;
    }
    let text = |name: &str| fields.get(name).cloned().unwrap_or_default();
    let number = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
    };

    Some(RoomRecord {
        room_id,
        session_id: SessionId::new(text("sid")),
        is_running: text("is_running") == "1",
        creation_time: number("creation_time"),
        created: text("created"),
        ended: text("ended"),
        participants: number("participants"),
        metadata: text("metadata"),
    })
}
