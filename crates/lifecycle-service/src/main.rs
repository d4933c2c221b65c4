//! Lifecycle Service
//!
//! Receives lifecycle webhooks from the media server and fans them out to
//! room state, notifications, recorder control, analytics and cleanup.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (filter and format come from configuration)
//! 3. Initialize Prometheus metrics recorder (ADR-0011)
//! 4. Connect to Redis
//! 5. Build collaborator clients, cleanup registry, coordinators, dispatcher
//! 6. Spawn the duration watchdog control listener
//! 7. Serve HTTP (webhook, health, metrics)
//! 8. Wait for shutdown signal, then drain in-flight fan-out tasks

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::secret::{redacted_origin, ExposeSecret};
use lifecycle_service::analytics::AnalyticsEmitter;
use lifecycle_service::cleanup::{
    production_registry, BreakoutClient, CleanupDependencies, JobQueue, RedisJobQueue,
    RedisSpeechService, SpeechService,
};
use lifecycle_service::clients::{
    connect_redis, HttpWebhookNotifier, RedisAnalyticsSink, RedisNotificationBus,
    RedisRecorderControl, RedisRoomStore, WebhookNotifier,
};
use lifecycle_service::config::Config;
use lifecycle_service::dispatcher::EventDispatcher;
use lifecycle_service::fanout::FanOut;
use lifecycle_service::observability::{init_metrics_recorder, HealthState};
use lifecycle_service::presence::{ParticipantPresenceTracker, ServiceIdentities};
use lifecycle_service::rooms::RoomLifecycleCoordinator;
use lifecycle_service::routes::{build_routes, AppState};
use lifecycle_service::watchdog::{run_control_listener, DurationWatchdog};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for in-flight fan-out tasks at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first: it decides the log format
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_filter.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting Lifecycle Service");
    info!(
        bind_address = %config.bind_address,
        webhook_forwarding = config.webhook_url.is_some(),
        client_channel = %config.client_channel,
        watchdog_channel = %config.watchdog_channel,
        recorder_channel = %config.recorder_channel,
        keep_uploads = config.keep_uploads,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder (ADR-0011)
    // This must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::anyhow!(e)
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    info!("Connecting to Redis...");
    let (redis_client, connection) = connect_redis(config.redis.url.expose_secret()).await?;
    info!("Redis connection established");

    // Collaborators
    let fanout = FanOut::new();
    let watchdog = DurationWatchdog::new();
    let service_identities = ServiceIdentities::new(config.service_identities.clone());

    let store = Arc::new(RedisRoomStore::new(connection.clone()));
    let bus = Arc::new(RedisNotificationBus::new(
        connection.clone(),
        config.client_channel.clone(),
        config.watchdog_channel.clone(),
    ));
    let recorder = Arc::new(RedisRecorderControl::new(
        connection.clone(),
        config.recorder_channel.clone(),
    ));
    let jobs: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(connection.clone()));
    let speech: Arc<dyn SpeechService> = Arc::new(RedisSpeechService::new(connection.clone()));
    let breakout = Arc::new(BreakoutClient::new(Arc::clone(&jobs)));

    let webhook: Option<Arc<dyn WebhookNotifier>> = match &config.webhook_url {
        Some(url) => {
            info!(webhook_origin = %redacted_origin(url), "Outbound webhook forwarding enabled");
            let notifier: Arc<dyn WebhookNotifier> = Arc::new(HttpWebhookNotifier::new(
                url.clone(),
                Duration::from_secs(config.webhook_timeout_seconds),
            )?);
            Some(notifier)
        }
        None => {
            info!("LC_WEBHOOK_URL not set, outbound webhook forwarding disabled");
            None
        }
    };

    let cleanup = production_registry(CleanupDependencies {
        connection: connection.clone(),
        jobs,
        breakout: Arc::clone(&breakout),
        speech: Arc::clone(&speech),
        upload_dir: (!config.keep_uploads).then(|| config.upload_dir.clone()),
    });
    info!(tasks = ?cleanup.names(), "Cleanup registry built");

    let rooms = Arc::new(RoomLifecycleCoordinator::new(
        store.clone(),
        bus,
        recorder,
        breakout,
        cleanup,
        watchdog.clone(),
        fanout.clone(),
    ));
    let presence = Arc::new(ParticipantPresenceTracker::new(
        store,
        speech,
        service_identities.clone(),
        fanout.clone(),
    ));
    let analytics = AnalyticsEmitter::new(
        Arc::new(RedisAnalyticsSink::new(connection)),
        service_identities,
    );
    let dispatcher = Arc::new(EventDispatcher::new(
        rooms,
        presence,
        analytics,
        webhook,
        fanout.clone(),
    ));

    let shutdown_token = CancellationToken::new();

    // Watchdog control listener (cross-instance removal)
    let listener_handle = tokio::spawn(run_control_listener(
        redis_client,
        config.watchdog_channel.clone(),
        watchdog,
        Arc::clone(&health_state),
        shutdown_token.child_token(),
    ));

    // HTTP server
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        anyhow::anyhow!("Invalid bind address: {e}")
    })?;
    let app = build_routes(
        Arc::new(AppState { dispatcher }),
        Arc::clone(&health_state),
        Some(prometheus_handle),
    );

    // Bind listener BEFORE marking ready to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind HTTP server");
        anyhow::anyhow!("Failed to bind HTTP server to {addr}: {e}")
    })?;
    health_state.set_ready();
    info!(addr = %addr, "Lifecycle Service listening");

    let server_token = shutdown_token.clone();
    let server_health = Arc::clone(&health_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received, initiating graceful shutdown...");
            // Mark as not ready immediately so k8s stops sending traffic
            server_health.set_not_ready();
            server_token.cancel();
        })
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e
        })?;

    shutdown_token.cancel();
    if let Err(e) = listener_handle.await {
        warn!(error = %e, "Watchdog control listener task failed");
    }

    info!(in_flight = fanout.in_flight(), "Draining fan-out tasks");
    if tokio::time::timeout(DRAIN_TIMEOUT, fanout.drain())
        .await
        .is_err()
    {
        warn!(
            in_flight = fanout.in_flight(),
            "Fan-out drain timed out, abandoning remaining tasks"
        );
    }

    info!("Lifecycle Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
