//! Room lifecycle coordinator.
//!
//! Owns the running/finished transitions of room records and everything that
//! hangs off them.
//!
//! # Start
//!
//! 1. Upsert the record (`running`, creation time).
//! 2. Stamp `started_at` into the metadata and register a duration watchdog
//!    entry if the metadata declares a limit.
//! 3. Run the breakout "after start" hook for breakout rooms (fan-out).
//! 4. Write stamped metadata back to the record.
//!
//! # Finish
//!
//! The status update happens first and is never an insert. Everything else is
//! scheduled after it as independent fan-out tasks, whether or not a record
//! existed, because other services key their state by room id or session id
//! only. Replaying a finish re-runs the fan-out; each collaborator is
//! idempotent.

use crate::cleanup::{BreakoutClient, CleanupContext, CleanupRegistry};
use crate::clients::{
    Channel, NotificationBus, NotificationMessage, RecorderControl, RecorderTask, RoomRecord,
    RoomStatusUpdate, RoomStore,
};
use crate::errors::LcError;
use crate::events::{RoomDescriptor, RoomMetadata};
use crate::fanout::FanOut;
use crate::watchdog::{DurationWatchdog, DurationWatchdogEntry};
use chrono::{DateTime, Utc};
use common::types::RoomId;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Record timestamp format (second precision, UTC).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format unix seconds for a room record. Non-positive or out-of-range values
/// fall back to `now`.
#[must_use]
pub fn format_timestamp(unix_seconds: i64, now: DateTime<Utc>) -> String {
    let at = if unix_seconds > 0 {
        DateTime::from_timestamp(unix_seconds, 0).unwrap_or(now)
    } else {
        now
    };
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// What `on_room_started` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartOutcome {
    /// Record written. False when the store refused a start for a finished
    /// or superseded session; nothing else happens in that case.
    pub record_written: bool,
    /// Duration limit (minutes) registered with the watchdog.
    pub watchdog_duration: Option<u64>,
}

/// What `on_room_finished` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinishOutcome {
    /// Record transitioned running -> finished by this call.
    pub transitioned: bool,
}

pub struct RoomLifecycleCoordinator {
    store: Arc<dyn RoomStore>,
    bus: Arc<dyn NotificationBus>,
    recorder: Arc<dyn RecorderControl>,
    breakout: Arc<BreakoutClient>,
    cleanup: CleanupRegistry,
    watchdog: DurationWatchdog,
    fanout: FanOut,
}

impl RoomLifecycleCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn RoomStore>,
        bus: Arc<dyn NotificationBus>,
        recorder: Arc<dyn RecorderControl>,
        breakout: Arc<BreakoutClient>,
        cleanup: CleanupRegistry,
        watchdog: DurationWatchdog,
        fanout: FanOut,
    ) -> Self {
        Self {
            store,
            bus,
            recorder,
            breakout,
            cleanup,
            watchdog,
            fanout,
        }
    }

    /// Handle `room_started`.
    ///
    /// # Errors
    ///
    /// Returns `LcError::MalformedEvent` for a blank room name, or the store
    /// error if the record could not be written. A store error is returned
    /// only after the watchdog, breakout and metadata steps have run.
    /// Metadata write-back failures are logged only.
    #[instrument(skip_all, fields(room_id = %room.name, session_id = %room.sid))]
    pub async fn on_room_started(&self, room: &RoomDescriptor) -> Result<StartOutcome, LcError> {
        let room_id = room.room_id()?;
        let now = Utc::now();

        let record = RoomRecord {
            room_id: room_id.clone(),
            session_id: room.sid.clone(),
            is_running: true,
            creation_time: room.creation_time,
            created: format_timestamp(room.creation_time, now),
            ended: String::new(),
            participants: 0,
            metadata: room.metadata.clone(),
        };

        let mut outcome = StartOutcome::default();
        let store_error = match self.store.upsert_room(&record, false).await {
            Ok(true) => {
                info!(target: "lc.rooms", room_id = %room_id, session_id = %room.sid, "Room started");
                outcome.record_written = true;
                None
            }
            Ok(false) => {
                warn!(target: "lc.rooms", room_id = %room_id, "Room start not applied");
                return Ok(outcome);
            }
            Err(e) => {
                warn!(
                    target: "lc.rooms",
                    room_id = %room_id,
                    error = %e,
                    "Failed to write room record, continuing with start"
                );
                Some(e)
            }
        };

        self.apply_start_metadata(&room_id, room, now, &mut outcome).await;

        match store_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Watchdog registration, breakout hook and `started_at` stamping.
    async fn apply_start_metadata(
        &self,
        room_id: &RoomId,
        room: &RoomDescriptor,
        now: DateTime<Utc>,
        outcome: &mut StartOutcome,
    ) {
        let metadata = match RoomMetadata::parse(&room.metadata) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return,
            Err(e) => {
                warn!(target: "lc.rooms", room_id = %room_id, error = %e, "Unreadable room metadata");
                return;
            }
        };

        let mut stamped = metadata.clone();
        let started_at = metadata
            .started_at
            .filter(|t| *t > 0)
            .unwrap_or_else(|| u64::try_from(now.timestamp()).unwrap_or(0));
        stamped.started_at = Some(started_at);

        if let Some(duration) = metadata.duration_limit() {
            self.watchdog.register(
                room_id.clone(),
                DurationWatchdogEntry {
                    session_id: room.sid.clone(),
                    duration,
                    started_at,
                },
            );
            outcome.watchdog_duration = Some(duration);
        }

        if metadata.is_breakout_room {
            let breakout = Arc::clone(&self.breakout);
            let room_id = room_id.clone();
            let session_id = room.sid.clone();
            let raw = room.metadata.clone();
            self.fanout.spawn("breakout_after_start", async move {
                breakout.after_start(&room_id, &session_id, &raw).await
            });
        }

        if stamped != metadata {
            self.write_back_metadata(room_id, room, &stamped).await;
        }
    }

    async fn write_back_metadata(
        &self,
        room_id: &RoomId,
        room: &RoomDescriptor,
        stamped: &RoomMetadata,
    ) {
        let result = match stamped.to_json() {
            Ok(json) => self.store.update_metadata(room_id, &room.sid, &json).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(written) => {
                debug!(target: "lc.rooms", room_id = %room_id, written = written, "Stored stamped metadata");
            }
            Err(e) => {
                warn!(target: "lc.rooms", room_id = %room_id, error = %e, "Failed to store stamped metadata");
            }
        }
    }

    /// Handle `room_finished`.
    ///
    /// The finish-time fan-out is scheduled even when the status update fails
    /// or finds no record.
    ///
    /// # Errors
    ///
    /// Returns `LcError::MalformedEvent` for a blank room name (nothing is
    /// scheduled), or the store error from the status update.
    #[instrument(skip_all, fields(room_id = %room.name, session_id = %room.sid))]
    pub async fn on_room_finished(&self, room: &RoomDescriptor) -> Result<FinishOutcome, LcError> {
        let room_id = room.room_id()?;

        let update = RoomStatusUpdate {
            room_id: room_id.clone(),
            session_id: room.sid.clone(),
            ended: format_timestamp(0, Utc::now()),
        };
        let status = self.store.update_status(&update).await;

        self.schedule_finish_fanout(&room_id, room);

        let transitioned = status?;
        if transitioned {
            info!(target: "lc.rooms", room_id = %room_id, session_id = %room.sid, "Room finished");
        } else {
            debug!(
                target: "lc.rooms",
                room_id = %room_id,
                session_id = %room.sid,
                "Finish did not change the record"
            );
        }
        Ok(FinishOutcome { transitioned })
    }

    fn schedule_finish_fanout(&self, room_id: &RoomId, room: &RoomDescriptor) {
        if let Some(entry) = self.watchdog.remove_session(room_id, &room.sid) {
            debug!(target: "lc.rooms", room_id = %room_id, duration = entry.duration, "Removed watchdog entry");
        }

        let recorder = Arc::clone(&self.recorder);
        let (session_id, rid) = (room.sid.clone(), room_id.clone());
        self.fanout.spawn("recorder_stop", async move {
            recorder
                .send_command(RecorderTask::Stop, &session_id, &rid)
                .await
        });

        let bus = Arc::clone(&self.bus);
        let message = NotificationMessage::delete_room(room_id);
        self.fanout.spawn("client_delete_room", async move {
            bus.publish(Channel::Client, &message).await
        });

        let bus = Arc::clone(&self.bus);
        let message = NotificationMessage::watchdog_delete(room_id, &room.sid);
        self.fanout.spawn("watchdog_delete", async move {
            bus.publish(Channel::Watchdog, &message).await
        });

        let ctx = CleanupContext {
            room_id: room_id.clone(),
            session_id: room.sid.clone(),
            metadata: room.metadata.clone(),
        };
        self.cleanup.schedule_all(&ctx, &self.fanout);
    }
}
