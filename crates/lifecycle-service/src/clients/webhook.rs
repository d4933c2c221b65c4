//! Outbound webhook forwarder.
//!
//! Every recognized lifecycle event is re-posted to an operator-configured
//! URL as a normalized envelope. The call is a single attempt with a request
//! timeout; the receiver's response body is ignored.

use crate::errors::LcError;
use crate::events::{
    EventKind, LifecycleEvent, ParticipantDescriptor, RoomDescriptor, TrackDescriptor,
};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::SessionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Header carrying the session id of the forwarded event.
pub const SESSION_ID_HEADER: &str = "X-Session-Id";

/// Normalized event as delivered to the external sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub event: EventKind,
    pub id: String,
    pub created_at: i64,
    pub room: RoomDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackDescriptor>,
}

impl WebhookEnvelope {
    /// Build the envelope for an event.
    ///
    /// # Errors
    ///
    /// Returns `LcError::MalformedEvent` if the event has no room descriptor
    /// or the room id is empty.
    pub fn from_event(event: &LifecycleEvent) -> Result<Self, LcError> {
        let room = event
            .room
            .as_ref()
            .ok_or_else(|| LcError::MalformedEvent("event has no room descriptor".to_string()))?;
        room.room_id()?;

        Ok(Self {
            event: event.kind,
            id: event.id.clone(),
            created_at: event.created_at,
            room: room.clone(),
            participant: event.participant.clone(),
            track: event.track.clone(),
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.room.sid
    }
}

/// External webhook sink.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn notify(&self, session_id: &SessionId, envelope: &WebhookEnvelope)
        -> Result<(), LcError>;
}

/// HTTP POST notifier.
pub struct HttpWebhookNotifier {
    client: reqwest::Client,
    url: SecretString,
}

impl HttpWebhookNotifier {
    /// Build a notifier with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `LcError::Http` if the HTTP client cannot be built.
    pub fn new(url: SecretString, timeout: Duration) -> Result<Self, LcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LcError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    #[instrument(skip_all, fields(event = envelope.event.as_str(), session_id = %session_id))]
    async fn notify(
        &self,
        session_id: &SessionId,
        envelope: &WebhookEnvelope,
    ) -> Result<(), LcError> {
        let response = self
            .client
            .post(self.url.expose_secret())
            .header(SESSION_ID_HEADER, session_id.as_str())
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                // Do NOT log the URL: it may embed an API key
                warn!(
                    target: "lc.webhook",
                    error = %e,
                    timeout = e.is_timeout(),
                    "Webhook request failed"
                );
                LcError::Http(format!("Webhook request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "lc.webhook", status = status.as_u16(), "Webhook rejected");
            return Err(LcError::Http(format!("Webhook returned status {status}")));
        }

        debug!(target: "lc.webhook", status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}
