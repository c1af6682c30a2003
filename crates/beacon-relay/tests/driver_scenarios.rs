//! Integration tests for the relay driver's room lifecycle.
//!
//! These tests exercise the exact code paths the production WebSocket
//! server uses:
//! 1. Connections are registered with `RelayDriver`
//! 2. Room create/join/leave frames mutate the room store
//! 3. Messages fan out to every current member
//! 4. Disconnects behave like an explicit leave

#![allow(clippy::unwrap_used)]

use beacon_proto::ServerFrame;
use beacon_relay::{Clock, RelayAction, RelayConfig, RelayDriver, RelayEvent};
use chrono::{DateTime, TimeZone, Utc};

#[derive(Clone)]
struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn driver() -> RelayDriver<FixedClock> {
    let clock = FixedClock(Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap());
    RelayDriver::new(clock, RelayConfig::default())
}

fn open(driver: &mut RelayDriver<FixedClock>, conn_id: u64, user_id: &str) {
    driver
        .process_event(RelayEvent::ConnectionOpened { conn_id, user_id: user_id.to_string() })
        .unwrap();
}

fn frame(driver: &mut RelayDriver<FixedClock>, conn_id: u64, text: &str) -> Vec<RelayAction> {
    driver.process_event(RelayEvent::FrameReceived { conn_id, text: text.to_string() }).unwrap()
}

fn close(driver: &mut RelayDriver<FixedClock>, conn_id: u64) -> Vec<RelayAction> {
    driver
        .process_event(RelayEvent::ConnectionClosed {
            conn_id,
            reason: "peer disconnected".to_string(),
        })
        .unwrap()
}

/// Collect all frames sent directly to a specific connection.
fn frames_for_conn(actions: &[RelayAction], target: u64) -> Vec<ServerFrame> {
    actions
        .iter()
        .filter_map(|a| match a {
            RelayAction::Send { conn_id, frame } if *conn_id == target => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

/// Collect all frames broadcast to a specific room.
fn broadcasts_for_room(actions: &[RelayAction], target: &str) -> Vec<ServerFrame> {
    actions
        .iter()
        .filter_map(|a| match a {
            RelayAction::Broadcast { room_id, frame } if room_id == target => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn create_room_acknowledges_host_and_seeds_membership() {
    let mut driver = driver();
    open(&mut driver, 1, "u1");

    let actions = frame(&mut driver, 1, r#"{"type":"create_room","roomId":"R1"}"#);

    let replies = frames_for_conn(&actions, 1);
    assert_eq!(replies.len(), 1, "host should receive room_created");
    assert!(matches!(&replies[0], ServerFrame::RoomCreated { room_id } if room_id == "R1"));

    assert_eq!(driver.participants("R1"), Some(vec!["u1".to_string()]));
}

#[test]
fn join_room_broadcasts_roster_to_all_members() {
    let mut driver = driver();
    open(&mut driver, 1, "u1");
    open(&mut driver, 2, "u2");
    frame(&mut driver, 1, r#"{"type":"create_room","roomId":"R1"}"#);

    let actions = frame(&mut driver, 2, r#"{"type":"join_room","roomId":"R1"}"#);

    let broadcasts = broadcasts_for_room(&actions, "R1");
    assert_eq!(broadcasts.len(), 1, "join should produce one room_joined broadcast");
    match &broadcasts[0] {
        ServerFrame::RoomJoined { room_id, participants, user_id } => {
            assert_eq!(room_id, "R1");
            assert_eq!(participants, &["u1".to_string(), "u2".to_string()]);
            assert_eq!(user_id, "u2");
        },
        other => panic!("expected room_joined, got {other:?}"),
    }

    // Both members resolve as broadcast recipients.
    let mut conns = driver.connections_in_room("R1");
    conns.sort_unstable();
    assert_eq!(conns, vec![1, 2]);
}

#[test]
fn message_fans_out_to_all_members_with_timestamp() {
    let mut driver = driver();
    open(&mut driver, 1, "u1");
    open(&mut driver, 2, "u2");
    frame(&mut driver, 1, r#"{"type":"create_room","roomId":"R1"}"#);
    frame(&mut driver, 2, r#"{"type":"join_room","roomId":"R1"}"#);

    let actions =
        frame(&mut driver, 2, r#"{"type":"message","roomId":"R1","message":{"text":"hi"}}"#);

    let broadcasts = broadcasts_for_room(&actions, "R1");
    assert_eq!(broadcasts.len(), 1);
    match &broadcasts[0] {
        ServerFrame::Message { sender_id, room_id, message, timestamp } => {
            assert_eq!(sender_id, "u2");
            assert_eq!(room_id, "R1");
            assert_eq!(message["text"], "hi");
            assert_eq!(timestamp, "2026-08-24T12:00:00.000Z");
        },
        other => panic!("expected message, got {other:?}"),
    }
}

#[test]
fn disconnect_notifies_remaining_members() {
    let mut driver = driver();
    open(&mut driver, 1, "u1");
    open(&mut driver, 2, "u2");
    frame(&mut driver, 1, r#"{"type":"create_room","roomId":"R1"}"#);
    frame(&mut driver, 2, r#"{"type":"join_room","roomId":"R1"}"#);

    let actions = close(&mut driver, 1);

    let broadcasts = broadcasts_for_room(&actions, "R1");
    assert_eq!(broadcasts.len(), 1);
    assert!(matches!(&broadcasts[0], ServerFrame::ParticipantLeft { user_id } if user_id == "u1"));

    assert_eq!(driver.participants("R1"), Some(vec!["u2".to_string()]));
    assert_eq!(driver.connection_count(), 1);
}

#[test]
fn last_leave_deletes_room_and_later_join_fails() {
    let mut driver = driver();
    open(&mut driver, 1, "u1");
    open(&mut driver, 2, "u2");
    frame(&mut driver, 1, r#"{"type":"create_room","roomId":"R1"}"#);
    frame(&mut driver, 2, r#"{"type":"join_room","roomId":"R1"}"#);
    close(&mut driver, 1);

    // u2 is now the last member; their leave empties and deletes the room.
    let actions = frame(&mut driver, 2, r#"{"type":"leave_room","roomId":"R1"}"#);
    assert!(broadcasts_for_room(&actions, "R1").is_empty(), "no members remain to notify");
    assert!(!driver.has_room("R1"));
    assert_eq!(driver.room_count(), 0);

    // The room id is gone, not recyclable via join.
    open(&mut driver, 3, "u3");
    let actions = frame(&mut driver, 3, r#"{"type":"join_room","roomId":"R1"}"#);
    let replies = frames_for_conn(&actions, 3);
    assert_eq!(replies.len(), 1);
    assert!(matches!(
        &replies[0],
        ServerFrame::Error { message } if message.contains("Room not found")
    ));
}

#[test]
fn join_unknown_room_errors_to_sender_only() {
    let mut driver = driver();
    open(&mut driver, 1, "u1");
    open(&mut driver, 2, "u2");
    open(&mut driver, 3, "u3");
    frame(&mut driver, 1, r#"{"type":"create_room","roomId":"R1"}"#);
    frame(&mut driver, 2, r#"{"type":"join_room","roomId":"R1"}"#);

    let actions = frame(&mut driver, 3, r#"{"type":"join_room","roomId":"UNKNOWN"}"#);

    let replies = frames_for_conn(&actions, 3);
    assert_eq!(replies.len(), 1);
    assert!(matches!(
        &replies[0],
        ServerFrame::Error { message } if message.contains("Room not found")
    ));

    // Nothing was broadcast anywhere.
    assert!(!actions.iter().any(|a| matches!(a, RelayAction::Broadcast { .. })));
    assert!(!actions
        .iter()
        .any(|a| matches!(a, RelayAction::Send { conn_id, .. } if *conn_id != 3)));
}

#[test]
fn full_session_walkthrough() {
    let mut driver = driver();
    open(&mut driver, 1, "u1");
    open(&mut driver, 2, "u2");

    frame(&mut driver, 1, r#"{"type":"create_room","roomId":"R1"}"#);
    frame(&mut driver, 2, r#"{"type":"join_room","roomId":"R1"}"#);
    frame(&mut driver, 2, r#"{"type":"message","roomId":"R1","message":{"text":"on my way"}}"#);
    close(&mut driver, 1);
    frame(&mut driver, 2, r#"{"type":"leave_room","roomId":"R1"}"#);
    close(&mut driver, 2);

    assert_eq!(driver.connection_count(), 0);
    assert_eq!(driver.room_count(), 0);
}
