//! Participant counting, analytics emission and webhook forwarding.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use lc_test_utils::*;
use lifecycle_service::analytics::{AnalyticsEventName, AnalyticsEventType};
use lifecycle_service::events::{EventKind, TrackSource};
use std::sync::Arc;

async fn started(harness: &TestHarness, name: &str) -> TestRoom {
    let room = TestRoom::new(name);
    harness.dispatch(room_started(&room)).await;
    room
}

// ============================================================================
// Participant count
// ============================================================================

#[tokio::test]
async fn test_join_and_leave_adjust_count() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    let alice = TestParticipant::new("alice");
    let bob = TestParticipant::new("bob");

    harness.dispatch(participant_joined(&room, &alice)).await;
    harness.dispatch(participant_joined(&room, &bob)).await;
    assert_eq!(harness.store.get("standup").unwrap().participants, 2);

    harness.dispatch(participant_left(&room, &alice)).await;
    assert_eq!(harness.store.get("standup").unwrap().participants, 1);
}

#[tokio::test]
async fn test_service_participants_are_not_counted() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;

    harness
        .dispatch(participant_joined(&room, &TestParticipant::recorder_bot()))
        .await;
    harness
        .dispatch(participant_joined(&room, &TestParticipant::rtmp_bot()))
        .await;
    harness
        .dispatch(participant_left(&room, &TestParticipant::recorder_bot()))
        .await;

    assert_eq!(harness.store.get("standup").unwrap().participants, 0);
    assert!(harness.analytics.events().is_empty());
    assert!(harness.speech.ended_users().is_empty());
}

#[tokio::test]
async fn test_unmatched_leave_goes_negative() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;

    harness
        .dispatch(participant_left(&room, &TestParticipant::new("ghost")))
        .await;

    assert_eq!(harness.store.get("standup").unwrap().participants, -1);
}

#[tokio::test]
async fn test_join_for_unknown_room_changes_nothing() {
    let harness = TestHarness::new();
    let room = TestRoom::new("never-started");

    harness
        .dispatch(participant_joined(&room, &TestParticipant::new("alice")))
        .await;

    assert!(harness.store.is_empty());
    // Still forwarded and still recorded for analytics
    assert_eq!(harness.webhook.delivered().len(), 1);
    assert_eq!(harness.analytics.events().len(), 1);
}

#[tokio::test]
async fn test_join_for_previous_session_is_ignored() {
    let harness = TestHarness::new();
    let current = started(&harness, "standup").await;
    let stale = current.clone().with_sid("RM_stale");

    harness
        .dispatch(participant_joined(&stale, &TestParticipant::new("alice")))
        .await;

    assert_eq!(harness.store.get("standup").unwrap().participants, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_and_leaves_net_to_zero() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let participant = TestParticipant::new(format!("user-{i}"));
        for event in [
            participant_joined(&room, &participant),
            participant_left(&room, &participant),
        ] {
            let dispatcher = Arc::clone(&harness.dispatcher);
            handles.push(tokio::spawn(async move {
                dispatcher.dispatch(event).await;
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }
    harness.settle().await;

    assert_eq!(harness.store.get("standup").unwrap().participants, 0);
    assert_eq!(harness.speech.ended_users().len(), 50);
}

#[tokio::test]
async fn test_leave_ends_speech_session() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    let alice = TestParticipant::new("alice");

    harness.dispatch(participant_joined(&room, &alice)).await;
    harness.dispatch(participant_left(&room, &alice)).await;

    let ended = harness.speech.ended_users();
    assert_eq!(ended.len(), 1);
    let (room_id, session_id, user) = ended.first().unwrap();
    assert_eq!(room_id.as_str(), "standup");
    assert_eq!(session_id.as_str(), room.sid);
    assert_eq!(user, "alice");
}

#[tokio::test]
async fn test_speech_failure_does_not_block_count() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    harness.speech.set_failing(true);
    let alice = TestParticipant::new("alice");

    harness.dispatch(participant_joined(&room, &alice)).await;
    harness.dispatch(participant_left(&room, &alice)).await;

    assert_eq!(harness.store.get("standup").unwrap().participants, 0);
}

#[tokio::test]
async fn test_store_failure_still_ends_speech_session() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    let alice = TestParticipant::new("alice");
    harness.dispatch(participant_joined(&room, &alice)).await;

    harness.store.set_failing(true);
    harness.dispatch(participant_left(&room, &alice)).await;

    let ended = harness.speech.ended_users();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended.first().unwrap().2, "alice");
}

#[tokio::test]
async fn test_service_participant_leave_skips_speech_even_on_store_failure() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    harness.store.set_failing(true);

    harness
        .dispatch(participant_left(&room, &TestParticipant::recorder_bot()))
        .await;

    assert!(harness.speech.ended_users().is_empty());
}

// ============================================================================
// Analytics
// ============================================================================

#[tokio::test]
async fn test_join_emits_room_scoped_event() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    let alice = TestParticipant::new("alice").with_metadata(r#"{"role":"host"}"#);

    harness.dispatch(participant_joined(&room, &alice)).await;

    let events = harness.analytics.events();
    assert_eq!(events.len(), 1);
    let event = events.first().unwrap();
    assert_eq!(event.event_type, AnalyticsEventType::Room);
    assert_eq!(event.event_name, AnalyticsEventName::UserJoined);
    assert_eq!(event.room_id.as_str(), "standup");
    assert_eq!(event.user_id.as_deref(), Some("alice"));
    assert_eq!(event.user_name.as_deref(), Some("User alice"));
    assert_eq!(event.extra_data.as_deref(), Some(r#"{"role":"host"}"#));
    assert_eq!(event.time, 1_706_000_100);
    assert!(!event.is_status());
}

#[tokio::test]
async fn test_leave_emits_user_scoped_event() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;

    harness
        .dispatch(participant_left(&room, &TestParticipant::new("alice")))
        .await;

    let events = harness.analytics.events();
    let event = events.first().unwrap();
    assert_eq!(event.event_type, AnalyticsEventType::User);
    assert_eq!(event.event_name, AnalyticsEventName::UserLeft);
}

#[tokio::test]
async fn test_camera_publish_and_unpublish_status() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    let alice = TestParticipant::new("alice");

    harness
        .dispatch(track_published(&room, &alice, TrackSource::Camera))
        .await;
    harness
        .dispatch(track_unpublished(&room, &alice, TrackSource::Camera))
        .await;

    let events = harness.analytics.events();
    assert_eq!(events.len(), 2);
    let statuses: Vec<_> = events
        .iter()
        .map(|e| (e.event_name, e.status_value.clone().unwrap()))
        .collect();
    assert!(statuses.contains(&(AnalyticsEventName::WebcamStatus, "started".to_string())));
    assert!(statuses.contains(&(AnalyticsEventName::WebcamStatus, "ended".to_string())));
}

#[tokio::test]
async fn test_microphone_and_screen_share_status() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    let alice = TestParticipant::new("alice");

    harness
        .dispatch(track_published(&room, &alice, TrackSource::Microphone))
        .await;
    harness
        .dispatch(track_published(&room, &alice, TrackSource::ScreenShare))
        .await;

    let mut names: Vec<_> = harness
        .analytics
        .events()
        .into_iter()
        .map(|e| e.event_name.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["mic_status", "screen_share_status"]);
}

#[tokio::test]
async fn test_unknown_track_source_emits_nothing() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;

    harness
        .dispatch(track_published(
            &room,
            &TestParticipant::new("alice"),
            TrackSource::Other,
        ))
        .await;

    assert!(harness.analytics.events().is_empty());
    // Still forwarded
    assert_eq!(harness.webhook.delivered().len(), 2);
}

#[tokio::test]
async fn test_room_events_emit_no_analytics() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    harness.dispatch(room_finished(&room)).await;

    assert!(harness.analytics.events().is_empty());
}

#[tokio::test]
async fn test_analytics_failure_does_not_block_count() {
    let harness = TestHarness::new();
    let room = started(&harness, "standup").await;
    harness.analytics.set_failing(true);

    harness
        .dispatch(participant_joined(&room, &TestParticipant::new("alice")))
        .await;

    assert_eq!(harness.store.get("standup").unwrap().participants, 1);
    assert_eq!(harness.analytics.events().len(), 1);
}

// ============================================================================
// Webhook forwarding
// ============================================================================

#[tokio::test]
async fn test_every_recognized_kind_is_forwarded() {
    let harness = TestHarness::new();
    let room = TestRoom::new("standup");
    let alice = TestParticipant::new("alice");

    harness.dispatch(room_started(&room)).await;
    harness.dispatch(participant_joined(&room, &alice)).await;
    harness
        .dispatch(participant_joined(&room, &TestParticipant::recorder_bot()))
        .await;
    harness
        .dispatch(track_published(&room, &alice, TrackSource::Microphone))
        .await;
    harness
        .dispatch(track_unpublished(&room, &alice, TrackSource::Microphone))
        .await;
    harness.dispatch(participant_left(&room, &alice)).await;
    harness.dispatch(room_finished(&room)).await;

    let delivered = harness.webhook.delivered();
    assert_eq!(delivered.len(), 7);
    assert!(delivered
        .iter()
        .all(|(session_id, _)| session_id.as_str() == room.sid));

    let started_envelope = delivered
        .iter()
        .map(|(_, envelope)| envelope)
        .find(|envelope| envelope.event == EventKind::RoomStarted)
        .unwrap();
    assert_eq!(started_envelope.room.name, "standup");
    assert!(started_envelope.participant.is_none());
}

#[tokio::test]
async fn test_event_without_room_is_not_forwarded() {
    let harness = TestHarness::new();

    harness
        .dispatch(event_without_room("participant_joined"))
        .await;
    harness.dispatch(event_without_room("room_finished")).await;

    assert!(harness.webhook.delivered().is_empty());
    assert!(harness.analytics.events().is_empty());
    assert!(harness.recorder.commands().is_empty());
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_unrecognized_kind_is_ignored() {
    let harness = TestHarness::new();
    let room = TestRoom::new("standup");

    harness.dispatch(unrecognized_event(&room)).await;

    assert!(harness.webhook.delivered().is_empty());
    assert!(harness.analytics.events().is_empty());
    assert!(harness.store.is_empty());
    assert!(harness.bus.published().is_empty());
}

#[tokio::test]
async fn test_forwarding_disabled_without_url() {
    let harness = TestHarness::builder().without_webhook().build();
    let room = TestRoom::new("standup");

    harness.dispatch(room_started(&room)).await;

    assert!(harness.webhook.delivered().is_empty());
    assert!(harness.store.get("standup").is_some());
}

#[tokio::test]
async fn test_forward_failure_does_not_block_processing() {
    let harness = TestHarness::new();
    harness.webhook.set_failing(true);
    let room = TestRoom::new("standup");

    harness.dispatch(room_started(&room)).await;
    harness.dispatch(room_finished(&room)).await;

    assert_eq!(harness.store.status_transitions(), 1);
    assert_eq!(harness.recorder.commands().len(), 1);
}
