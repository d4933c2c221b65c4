//! Lifecycle Service Library
//!
//! Routes lifecycle webhooks from the media server to every subsystem that
//! keeps state about a room:
//!
//! - Persisted room records (running/finished, participant count)
//! - Client notification bus and duration watchdog
//! - Recorder control
//! - Analytics
//! - Finish-time cleanup (uploads, shared documents, block lists, polls,
//!   breakout rooms, speech usage, analytics export)
//! - An operator-configured outbound webhook
//!
//! # Architecture
//!
//! ```text
//! POST /webhook
//!   └── EventDispatcher (stateless, one call per event)
//!       ├── RoomLifecycleCoordinator ─┐   synchronous: defines record state
//!       ├── ParticipantPresenceTracker┘
//!       └── FanOut (independent best-effort tasks)
//!           ├── AnalyticsEmitter
//!           ├── WebhookNotifier
//!           ├── RecorderControl / NotificationBus
//!           └── CleanupRegistry tasks
//! ```
//!
//! # Consistency Model
//!
//! The room record store is the only system of record and is mutated through
//! atomic single-record operations. Everything else is loosely consistent:
//! no retries, no cross-subsystem transactions, no redelivery. A dropped
//! collaborator call stays dropped unless the upstream redelivers the event.
//!
//! # Modules
//!
//! - [`dispatcher`] - Event classification and fan-out scheduling
//! - [`rooms`] - Room start/finish transitions
//! - [`presence`] - Join/leave counting
//! - [`analytics`] - Analytics mapping and emission
//! - [`cleanup`] - Finish-time cleanup tasks
//! - [`clients`] - Collaborator traits and Redis/HTTP clients
//! - [`watchdog`] - Duration watchdog registry and control listener
//! - [`fanout`] - Background task executor

pub mod analytics;
pub mod cleanup;
pub mod clients;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod fanout;
pub mod observability;
pub mod presence;
pub mod rooms;
pub mod routes;
pub mod watchdog;
