//! Duration watchdog registry.
//!
//! Process-wide map of room id to duration limit, shared by the room
//! coordinator (register on start, remove on finish) and the timer that ends
//! rooms whose limit has passed. Entries are not persisted; after a restart
//! they are rebuilt by replaying running rooms.
//!
//! # Cross-instance removal
//!
//! A room may start on one instance and finish on another. The finishing
//! instance publishes a `delete` message on the watchdog channel;
//! [`run_control_listener`] applies it on every instance. The message names
//! the finishing session, so a late finish for an earlier session leaves the
//! current session's entry in place.

use crate::clients::bus::{NotificationMessage, SESSION_ID_FIELD, WATCHDOG_DELETE};
use crate::observability::{metrics, HealthState};
use common::types::{RoomId, SessionId};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Initial reconnect delay of the control listener.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound of the reconnect delay.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// One registered room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationWatchdogEntry {
    pub session_id: SessionId,
    /// Limit in minutes.
    pub duration: u64,
    /// Unix seconds.
    pub started_at: u64,
}

impl DurationWatchdogEntry {
    /// Unix second at which the room must end.
    #[must_use]
    pub fn deadline(&self) -> u64 {
        self.started_at
            .saturating_add(self.duration.saturating_mul(60))
    }
}

/// Mutex-guarded registry. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct DurationWatchdog {
    entries: Arc<Mutex<HashMap<RoomId, DurationWatchdogEntry>>>,
}

impl DurationWatchdog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, DurationWatchdogEntry>> {
        // A panic while holding the lock cannot leave the map half-written
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or replace) the entry for a room.
    pub fn register(&self, room_id: RoomId, entry: DurationWatchdogEntry) {
        let count = {
            let mut entries = self.lock();
            entries.insert(room_id.clone(), entry);
            entries.len()
        };
        metrics::set_watchdog_entries(count);
        debug!(target: "lc.watchdog", room_id = %room_id, entries = count, "Registered room");
    }

    /// Remove the entry for a room.
    pub fn remove(&self, room_id: &RoomId) -> Option<DurationWatchdogEntry> {
        self.remove_session(room_id, &SessionId::default())
    }

    /// Remove the entry for a room only if it was registered by `session_id`.
    ///
    /// An empty `session_id` matches any entry.
    pub fn remove_session(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Option<DurationWatchdogEntry> {
        let (removed, count) = {
            let mut entries = self.lock();
            let matches = entries
                .get(room_id)
                .is_some_and(|entry| session_id.is_empty() || entry.session_id == *session_id);
            let removed = if matches { entries.remove(room_id) } else { None };
            (removed, entries.len())
        };
        if removed.is_some() {
            metrics::set_watchdog_entries(count);
            debug!(target: "lc.watchdog", room_id = %room_id, entries = count, "Removed room");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, room_id: &RoomId) -> Option<DurationWatchdogEntry> {
        self.lock().get(room_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Entries whose deadline is at or before `now` (unix seconds).
    #[must_use]
    pub fn expired(&self, now: u64) -> Vec<(RoomId, DurationWatchdogEntry)> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.deadline() <= now)
            .map(|(room_id, entry)| (room_id.clone(), entry.clone()))
            .collect()
    }

    /// Apply a control message. Returns true if an entry was removed.
    ///
    /// A `sessionId` field restricts the removal to that session. Unknown
    /// message types are ignored.
    pub fn apply(&self, message: &NotificationMessage) -> bool {
        if message.message_type != WATCHDOG_DELETE {
            return false;
        }
        let session_id = message
            .fields
            .get(SESSION_ID_FIELD)
            .and_then(|value| value.as_str())
            .map(SessionId::new)
            .unwrap_or_default();
        match RoomId::new(message.room_id.clone()) {
            Ok(room_id) => self.remove_session(&room_id, &session_id).is_some(),
            Err(_) => false,
        }
    }
}

/// Apply watchdog control messages from Redis pub/sub until cancelled.
///
/// Reconnects with exponential backoff (1s doubling up to 5 minutes).
#[instrument(skip_all, name = "lc.watchdog.listener")]
pub async fn run_control_listener(
    client: redis::Client,
    channel: String,
    watchdog: DurationWatchdog,
    health: Arc<HealthState>,
    cancel_token: CancellationToken,
) {
    info!(target: "lc.watchdog", channel = %channel, "Starting watchdog control listener");
    let mut backoff = INITIAL_BACKOFF;

    loop {
        tokio::select! {
            result = listen(&client, &channel, &watchdog, &health) => {
                health.set_watchdog_subscribed(false);
                match result {
                    Ok(()) => backoff = INITIAL_BACKOFF,
                    Err(e) => {
                        error!(
                            target: "lc.watchdog",
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Watchdog control listener failed, reconnecting"
                        );
                    }
                }
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    () = cancel_token.cancelled() => break,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            () = cancel_token.cancelled() => {
                info!(target: "lc.watchdog", "Watchdog control listener received shutdown signal, exiting");
                break;
            }
        }
    }

    health.set_watchdog_subscribed(false);
    info!(target: "lc.watchdog", "Watchdog control listener stopped");
}

/// One subscription lifetime. Returns `Err` when the connection drops.
async fn listen(
    client: &redis::Client,
    channel: &str,
    watchdog: &DurationWatchdog,
    health: &HealthState,
) -> Result<(), String> {
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|e| format!("failed to open pub/sub connection: {e}"))?;
    pubsub
        .subscribe(channel)
        .await
        .map_err(|e| format!("failed to subscribe: {e}"))?;

    health.set_watchdog_subscribed(true);
    info!(target: "lc.watchdog", channel = %channel, "Subscribed to watchdog control channel");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "lc.watchdog", error = %e, "Unreadable control message payload");
                continue;
            }
        };
        match serde_json::from_str::<NotificationMessage>(&payload) {
            Ok(message) => {
                let removed = watchdog.apply(&message);
                debug!(
                    target: "lc.watchdog",
                    message_type = %message.message_type,
                    room_id = %message.room_id,
                    removed = removed,
                    "Applied control message"
                );
            }
            Err(e) => {
                warn!(target: "lc.watchdog", error = %e, "Malformed control message");
            }
        }
    }

    Err("pub/sub connection closed".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn room(name: &str) -> RoomId {
        RoomId::new(name).unwrap()
    }

    fn entry(duration: u64, started_at: u64) -> DurationWatchdogEntry {
        DurationWatchdogEntry {
            session_id: SessionId::new("RM_1"),
            duration,
            started_at,
        }
    }

    #[test]
    fn test_register_get_remove() {
        let watchdog = DurationWatchdog::new();
        assert!(watchdog.is_empty());

        watchdog.register(room("standup"), entry(600, 1_000));
        assert_eq!(watchdog.len(), 1);
        assert_eq!(watchdog.get(&room("standup")).unwrap().duration, 600);

        assert!(watchdog.remove(&room("standup")).is_some());
        assert!(watchdog.remove(&room("standup")).is_none());
        assert!(watchdog.is_empty());
    }

    #[test]
    fn test_register_replaces_existing_entry() {
        let watchdog = DurationWatchdog::new();
        watchdog.register(room("standup"), entry(10, 1_000));
        watchdog.register(room("standup"), entry(20, 2_000));
        assert_eq!(watchdog.len(), 1);
        assert_eq!(watchdog.get(&room("standup")).unwrap().started_at, 2_000);
    }

    #[test]
    fn test_expired_uses_minutes() {
        let watchdog = DurationWatchdog::new();
        watchdog.register(room("short"), entry(1, 1_000));
        watchdog.register(room("long"), entry(60, 1_000));

        assert!(watchdog.expired(1_059).is_empty());

        let expired = watchdog.expired(1_060);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired.first().unwrap().0, room("short"));
    }

    #[test]
    fn test_apply_delete_message() {
        let watchdog = DurationWatchdog::new();
        watchdog.register(room("standup"), entry(600, 1_000));

        assert!(!watchdog.apply(&NotificationMessage::delete_room(&room("standup"))));
        assert_eq!(watchdog.len(), 1);

        let stale = NotificationMessage::watchdog_delete(&room("standup"), &SessionId::new("RM_0"));
        assert!(!watchdog.apply(&stale));
        assert_eq!(watchdog.len(), 1);

        let current = NotificationMessage::watchdog_delete(&room("standup"), &SessionId::new("RM_1"));
        assert!(watchdog.apply(&current));
        assert!(watchdog.is_empty());
    }

    #[test]
    fn test_room_wide_delete_ignores_session() {
        let watchdog = DurationWatchdog::new();
        watchdog.register(room("standup"), entry(600, 1_000));

        let message = NotificationMessage::watchdog_delete(&room("standup"), &SessionId::default());
        assert!(watchdog.apply(&message));
        assert!(watchdog.is_empty());
    }

    #[test]
    fn test_remove_session_keeps_other_sessions() {
        let watchdog = DurationWatchdog::new();
        watchdog.register(room("standup"), entry(600, 1_000));

        assert!(watchdog
            .remove_session(&room("standup"), &SessionId::new("RM_0"))
            .is_none());
        assert!(watchdog
            .remove_session(&room("standup"), &SessionId::new("RM_1"))
            .is_some());
        assert!(watchdog.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let watchdog = DurationWatchdog::new();
        let timer_view = watchdog.clone();
        watchdog.register(room("standup"), entry(5, 0));
        assert_eq!(timer_view.len(), 1);
    }

    #[tokio::test]
    async fn test_listener_exits_on_cancellation() {
        // Unroutable address: every connect attempt fails and the listener
        // sits in backoff until cancelled.
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let health = Arc::new(HealthState::new());
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        tokio::time::timeout(
            Duration::from_secs(5),
            run_control_listener(
                client,
                "lc:room-duration-watchdog".to_string(),
                DurationWatchdog::new(),
                Arc::clone(&health),
                cancel_token,
            ),
        )
        .await
        .expect("listener should exit promptly once cancelled");
        assert!(!health.is_watchdog_subscribed());
    }
}
