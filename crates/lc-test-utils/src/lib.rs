//! # LC Test Utilities
//!
//! Shared test utilities for the Lifecycle Service (LC).
//!
//! This crate provides mock implementations and test fixtures for isolated
//! LC testing without Redis or an outbound webhook receiver.
//!
//! ## Modules
//!
//! - `mock_store` - In-memory room record store with the same atomicity and
//!   session guards as the Redis scripts
//! - `mock_collaborators` - Recording mocks (bus, recorder, analytics sink,
//!   webhook notifier, job queue, speech service, cleanup task) with failure
//!   injection
//! - `fixtures` - Room/participant builders and lifecycle event constructors
//! - `harness` - Dispatcher wired to all of the above
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let room = TestRoom::new("standup").with_duration(600);
//!
//!     harness.dispatch(room_started(&room)).await;
//!     harness.dispatch(room_finished(&room)).await;
//!
//!     assert_eq!(harness.store.status_transitions(), 1);
//!     assert!(harness.watchdog.is_empty());
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_collaborators;
pub mod mock_store;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
pub use mock_collaborators::*;
pub use mock_store::*;
