/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Integration tests for the per-client event bus.

use peercall_client::{CallEndReason, ClientEvent, ConnectionState, EventBus, EVENT_BUS_CAPACITY};

#[test]
fn test_event_bus_capacity() {
    let bus = EventBus::new();
    assert_eq!(bus.capacity(), EVENT_BUS_CAPACITY);
    assert_eq!(EVENT_BUS_CAPACITY, 256);
}

#[test]
fn test_emit_without_subscribers_does_not_panic() {
    let bus = EventBus::new();
    bus.emit(ClientEvent::LoggedOut);
    bus.emit(ClientEvent::ConnectionStateChanged(ConnectionState::Closed));
    bus.emit(ClientEvent::PermissionDenied("error".to_string()));
}

#[test]
fn test_subscribe_after_emit_sees_only_new_events() {
    let bus = EventBus::new();
    bus.emit(ClientEvent::LoggedOut);

    let mut rx = bus.subscribe();
    assert!(rx.try_recv().is_err());

    bus.emit(ClientEvent::ErrorCleared);
    assert!(matches!(rx.try_recv(), Ok(ClientEvent::ErrorCleared)));
}

#[test]
fn test_buses_are_independent() {
    let first = EventBus::new();
    let second = EventBus::new();
    let mut rx = second.subscribe();

    first.emit(ClientEvent::IncomingCall("alice@example.com".to_string()));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_clones_share_the_channel() {
    let bus = EventBus::new();
    let clone = bus.clone();
    let mut rx = bus.subscribe();

    clone.emit(ClientEvent::VideoToggled(false));
    assert!(matches!(rx.try_recv(), Ok(ClientEvent::VideoToggled(false))));
}

#[test]
fn test_slow_subscriber_loses_oldest_events() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();

    for i in 0..EVENT_BUS_CAPACITY + 10 {
        bus.emit(ClientEvent::OutgoingCall(format!("peer{i}@example.com")));
    }

    // The first read reports the overflow, then the newest events remain.
    let mut received = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ClientEvent::OutgoingCall(address)) => received.push(address),
            Ok(other) => panic!("unexpected event {other:?}"),
            Err(async_broadcast::TryRecvError::Overflowed(_)) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(received.len(), EVENT_BUS_CAPACITY);
    assert_eq!(received[0], "peer10@example.com");
}

#[tokio::test]
async fn test_multiple_subscribers_receive_same_event() {
    let bus = EventBus::new();
    let mut rx1 = bus.subscribe();
    let mut rx2 = bus.subscribe();

    let first = tokio::spawn(async move { rx1.recv().await });
    let second = tokio::spawn(async move { rx2.recv().await });

    bus.emit(ClientEvent::CallEnded {
        remote: Some("bob@example.com".to_string()),
        reason: CallEndReason::Hangup,
    });

    for handle in [first, second] {
        match handle.await.unwrap() {
            Ok(ClientEvent::CallEnded { remote, reason }) => {
                assert_eq!(remote.as_deref(), Some("bob@example.com"));
                assert_eq!(reason, CallEndReason::Hangup);
            }
            other => panic!("expected CallEnded, got {other:?}"),
        }
    }
}
