//! Participant presence tracking.
//!
//! Join/leave events adjust the room's participant count with one atomic
//! delta each. Internal service participants (recorder, broadcast relay)
//! join rooms like users do but are never counted.
//!
//! The count is not clamped. A negative result means the upstream delivered
//! a leave without its join; it is logged and counted so it stays visible.

use crate::cleanup::SpeechService;
use crate::clients::RoomStore;
use crate::errors::LcError;
use crate::events::{ParticipantDescriptor, RoomDescriptor};
use crate::fanout::FanOut;
use crate::observability::metrics;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Identities of internal service participants.
#[derive(Debug, Clone, Default)]
pub struct ServiceIdentities(Arc<HashSet<String>>);

impl ServiceIdentities {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(identities.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.0.contains(identity)
    }
}

/// Result of one join/leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    /// Service participant, nothing changed.
    Ignored,
    /// Count applied; carries the new count.
    Counted(i64),
    /// No record for this room/session, nothing changed.
    UnknownRoom,
}

pub struct ParticipantPresenceTracker {
    store: Arc<dyn RoomStore>,
    speech: Arc<dyn SpeechService>,
    service_identities: ServiceIdentities,
    fanout: FanOut,
}

impl ParticipantPresenceTracker {
    #[must_use]
    pub fn new(
        store: Arc<dyn RoomStore>,
        speech: Arc<dyn SpeechService>,
        service_identities: ServiceIdentities,
        fanout: FanOut,
    ) -> Self {
        Self {
            store,
            speech,
            service_identities,
            fanout,
        }
    }

    #[must_use]
    pub fn is_service_participant(&self, participant: &ParticipantDescriptor) -> bool {
        self.service_identities.contains(&participant.identity)
    }

    /// Count a genuine participant in.
    ///
    /// # Errors
    ///
    /// Returns `LcError::MalformedEvent` for a blank room name, or the store
    /// error if the delta could not be applied.
    #[instrument(skip_all, fields(room_id = %room.name, session_id = %room.sid))]
    pub async fn on_participant_joined(
        &self,
        room: &RoomDescriptor,
        participant: &ParticipantDescriptor,
    ) -> Result<PresenceOutcome, LcError> {
        self.apply(room, participant, 1).await
    }

    /// Count a genuine participant out and close their speech session.
    ///
    /// The speech session is closed even if the count update fails.
    ///
    /// # Errors
    ///
    /// Same as [`Self::on_participant_joined`].
    #[instrument(skip_all, fields(room_id = %room.name, session_id = %room.sid))]
    pub async fn on_participant_left(
        &self,
        room: &RoomDescriptor,
        participant: &ParticipantDescriptor,
    ) -> Result<PresenceOutcome, LcError> {
        if self.is_service_participant(participant) {
            return self.apply(room, participant, -1).await;
        }

        let outcome = self.apply(room, participant, -1).await;

        // Speech accounting is closed even when the count update failed
        if !participant.identity.is_empty() {
            let speech = Arc::clone(&self.speech);
            let room_id = room.room_id()?;
            let session_id = room.sid.clone();
            let user_id = participant.identity.clone();
            self.fanout.spawn("speech_end_user", async move {
                let used = speech
                    .end_user_session(&room_id, &session_id, &user_id)
                    .await?;
                debug!(target: "lc.presence", room_id = %room_id, used_seconds = used, "Closed speech session");
                Ok(())
            });
        }

        outcome
    }

    async fn apply(
        &self,
        room: &RoomDescriptor,
        participant: &ParticipantDescriptor,
        delta: i64,
    ) -> Result<PresenceOutcome, LcError> {
        if self.is_service_participant(participant) {
            debug!(target: "lc.presence", room_id = %room.name, "Ignoring service participant");
            return Ok(PresenceOutcome::Ignored);
        }

        let room_id = room.room_id()?;
        let count = self
            .store
            .adjust_participant_count(&room_id, &room.sid, delta)
            .await?;

        match count {
            None => {
                warn!(
                    target: "lc.presence",
                    room_id = %room_id,
                    session_id = %room.sid,
                    delta = delta,
                    "No room record for participant change"
                );
                Ok(PresenceOutcome::UnknownRoom)
            }
            Some(participants) if participants < 0 => {
                warn!(
                    target: "lc.presence",
                    room_id = %room_id,
                    session_id = %room.sid,
                    participants = participants,
                    "Participant count went negative"
                );
                metrics::record_negative_participant_count();
                Ok(PresenceOutcome::Counted(participants))
            }
            Some(participants) => {
                debug!(
                    target: "lc.presence",
                    room_id = %room_id,
                    participants = participants,
                    "Participant count updated"
                );
                Ok(PresenceOutcome::Counted(participants))
            }
        }
    }
}
