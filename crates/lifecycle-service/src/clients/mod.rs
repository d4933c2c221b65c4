//! Clients for the collaborators the lifecycle core talks to.
//!
//! Each collaborator sits behind a narrow async trait so the coordinators can
//! be exercised against in-memory mocks (see `lc-test-utils`). Production
//! implementations share one Redis `MultiplexedConnection`, which is cheap to
//! clone and safe to use concurrently, plus one `reqwest::Client` for the
//! outbound webhook.
//!
//! | Trait | Production impl | Transport |
//! |-------|-----------------|-----------|
//! | [`RoomStore`] | [`RedisRoomStore`] | Redis HASH + Lua |
//! | [`NotificationBus`] | [`RedisNotificationBus`] | Redis `PUBLISH` |
//! | [`RecorderControl`] | [`RedisRecorderControl`] | Redis `PUBLISH` |
//! | [`AnalyticsSink`] | [`RedisAnalyticsSink`] | Redis HASH / LIST |
//! | [`WebhookNotifier`] | [`HttpWebhookNotifier`] | HTTPS POST |

pub mod analytics_sink;
pub mod bus;
pub mod lua_scripts;
pub mod recorder;
pub mod store;
pub mod webhook;

pub use analytics_sink::{AnalyticsSink, RedisAnalyticsSink};
pub use bus::{Channel, NotificationBus, NotificationMessage, RedisNotificationBus};
pub use recorder::{RecorderCommand, RecorderControl, RecorderTask, RedisRecorderControl};
pub use store::{RedisRoomStore, RoomRecord, RoomStatusUpdate, RoomStore};
pub use webhook::{HttpWebhookNotifier, WebhookEnvelope, WebhookNotifier, SESSION_ID_HEADER};

use crate::errors::LcError;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::error;

/// Open a Redis client and its shared multiplexed connection.
///
/// # Errors
///
/// Returns `LcError::Redis` if the URL is invalid or the connection fails.
pub async fn connect_redis(redis_url: &str) -> Result<(Client, MultiplexedConnection), LcError> {
    let client = Client::open(redis_url).map_err(|e| {
        // Do NOT log redis_url: it may contain credentials
        error!(target: "lc.redis", error = %e, "Failed to open Redis client");
        LcError::Redis(format!("Failed to open Redis client: {e}"))
    })?;

    let connection = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| {
            error!(target: "lc.redis", error = %e, "Failed to connect to Redis");
            LcError::Redis(format!("Failed to connect to Redis: {e}"))
        })?;

    Ok((client, connection))
}
