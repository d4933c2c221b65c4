//! Analytics sink.
//!
//! Redis layout:
//!
//! | Key | Type | Written by |
//! |-----|------|------------|
//! | `lc:analytics:{room_id}:user:{user_id}` | HASH field=`event_name` value=`status` | status events |
//! | `lc:analytics:{room_id}:events` | LIST of JSON records | occurrence events |
//!
//! The export job reads both after the session ends.

use crate::analytics::AnalyticsEvent;
use crate::errors::LcError;
use async_trait::async_trait;
use common::types::RoomId;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{instrument, warn};

#[must_use]
pub fn status_key(room_id: &RoomId, user_id: &str) -> String {
    format!("lc:analytics:{room_id}:user:{user_id}")
}

#[must_use]
pub fn events_key(room_id: &RoomId) -> String {
    format!("lc:analytics:{room_id}:events")
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn emit(&self, event: &AnalyticsEvent) -> Result<(), LcError>;
}

#[derive(Clone)]
pub struct RedisAnalyticsSink {
    connection: MultiplexedConnection,
}

impl RedisAnalyticsSink {
    #[must_use]
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

fn sink_error(e: &redis::RedisError, event: &AnalyticsEvent) -> LcError {
    warn!(
        target: "lc.analytics",
        error = %e,
        room_id = %event.room_id,
        event_name = event.event_name.as_str(),
        "Analytics write failed"
    );
    LcError::Redis(format!("Analytics write failed: {e}"))
}

#[async_trait]
impl AnalyticsSink for RedisAnalyticsSink {
    #[instrument(skip_all, fields(room_id = %event.room_id, event_name = event.event_name.as_str()))]
    async fn emit(&self, event: &AnalyticsEvent) -> Result<(), LcError> {
        let mut conn = self.connection.clone();

        match (&event.status_value, &event.user_id) {
            (Some(status), Some(user_id)) => {
                let _: i64 = conn
                    .hset(
                        status_key(&event.room_id, user_id),
                        event.event_name.as_str(),
                        status,
                    )
                    .await
                    .map_err(|e| sink_error(&e, event))?;
            }
            (Some(_), None) => {
                return Err(LcError::MalformedEvent(
                    "status event without a user id".to_string(),
                ));
            }
            (None, _) => {
                let record = serde_json::to_string(event)?;
                let _: i64 = conn
                    .rpush(events_key(&event.room_id), record)
                    .await
                    .map_err(|e| sink_error(&e, event))?;
            }
        }
        Ok(())
    }
}
