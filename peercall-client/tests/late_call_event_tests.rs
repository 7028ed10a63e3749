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


//! Events that arrive for a call after it ended, delivered by a scripted
//! backend whose channels the test drives by hand.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use common::{settle, test_options};
use peercall_client::loopback::{LoopbackPeerConnection, RecordingSurface, SyntheticMediaDevices};
use peercall_client::{
    CallEvent, CallLink, CallOrchestrator, MediaCall, PeerConnection, PeerEvent, PeerLink,
    SignalingBackend, SignalingPeer, SignalingServer,
};
use peercall_types::{
    encode_peer_id, MediaStream, MediaTrack, PeerId, SignalingError, SignalingErrorKind,
    TrackKind, TrackSource,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct ScriptedBackend {
    peer_events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
}

impl ScriptedBackend {
    /// Rings the signed-in peer from `caller`. Returns the call and the
    /// sender of its events.
    fn ring(&self, caller: &str) -> (Arc<ScriptedCall>, mpsc::UnboundedSender<CallEvent>) {
        let call = Arc::new(ScriptedCall {
            remote: encode_peer_id(caller),
            pc: Arc::new(LoopbackPeerConnection::default()),
            closed: AtomicBool::new(false),
        });
        let (tx, events) = mpsc::unbounded_channel();
        let media_call: Arc<dyn MediaCall> = call.clone();
        let link = CallLink {
            call: media_call,
            events,
        };
        let peer_events = self.peer_events.lock().unwrap();
        peer_events
            .as_ref()
            .expect("signed in")
            .send(PeerEvent::IncomingCall(link))
            .unwrap();
        (call, tx)
    }
}

impl SignalingBackend for ScriptedBackend {
    fn create_peer(
        &self,
        _server: &SignalingServer,
        _ice_servers: &[String],
        id: Option<&PeerId>,
    ) -> Result<PeerLink, SignalingError> {
        let id = id.cloned().expect("login asks for an id");
        let (tx, events) = mpsc::unbounded_channel();
        tx.send(PeerEvent::Open(id.clone())).unwrap();
        *self.peer_events.lock().unwrap() = Some(tx);
        let peer: Arc<dyn SignalingPeer> = Arc::new(ScriptedPeer {
            id,
            destroyed: AtomicBool::new(false),
        });
        Ok(PeerLink { peer, events })
    }
}

struct ScriptedPeer {
    id: PeerId,
    destroyed: AtomicBool,
}

impl SignalingPeer for ScriptedPeer {
    fn id(&self) -> Option<PeerId> {
        Some(self.id.clone())
    }

    fn call(&self, remote: &PeerId, _stream: &MediaStream) -> Result<CallLink, SignalingError> {
        Err(SignalingError::new(
            SignalingErrorKind::PeerUnavailable,
            format!("{remote} is not registered"),
        ))
    }

    fn reconnect(&self) {}

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

struct ScriptedCall {
    remote: PeerId,
    pc: Arc<LoopbackPeerConnection>,
    closed: AtomicBool,
}

impl MediaCall for ScriptedCall {
    fn remote_peer(&self) -> PeerId {
        self.remote.clone()
    }

    fn answer(&self, stream: &MediaStream) {
        self.pc.set_senders(stream.tracks());
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn peer_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        let pc: Arc<dyn PeerConnection> = self.pc.clone();
        Some(pc)
    }
}

fn remote_media(label: &str) -> MediaStream {
    MediaStream::new(vec![
        MediaTrack::remote(TrackKind::Video, format!("{label} camera")),
        MediaTrack::remote(TrackKind::Audio, format!("{label} microphone")),
    ])
}

struct Callee {
    client: CallOrchestrator,
    backend: Arc<ScriptedBackend>,
    remote_surface: Arc<RecordingSurface>,
}

async fn signed_in_callee() -> Callee {
    let backend = Arc::new(ScriptedBackend::default());
    let remote_surface = Arc::new(RecordingSurface::new());
    let client = CallOrchestrator::new(
        test_options(),
        backend.clone(),
        Arc::new(SyntheticMediaDevices::new()),
        Arc::new(RecordingSurface::new()),
        remote_surface.clone(),
    );
    client.login("alice@example.com").await.unwrap();
    settle().await;
    Callee {
        client,
        backend,
        remote_surface,
    }
}

/// Answers a call from `caller` and delivers its media.
async fn answered_call(
    callee: &Callee,
    caller: &str,
) -> (Arc<ScriptedCall>, mpsc::UnboundedSender<CallEvent>, MediaStream) {
    let (call, events) = callee.backend.ring(caller);
    settle().await;
    callee.client.accept_call().await.unwrap();
    let media = remote_media(caller);
    events.send(CallEvent::StreamReceived(media.clone())).unwrap();
    settle().await;
    assert!(callee.client.state().await.is_in_call);
    (call, events, media)
}

#[tokio::test(start_paused = true)]
async fn test_late_stream_from_finished_call_is_stopped() {
    let alice = signed_in_callee().await;

    let (first, first_events, _) = answered_call(&alice, "bob@example.com").await;
    alice.client.end_call().await;
    assert!(first.closed.load(Ordering::Acquire));

    let (second, _second_events, carol_media) = answered_call(&alice, "carol@example.com").await;

    let late = remote_media("bob@example.com");
    first_events.send(CallEvent::StreamReceived(late.clone())).unwrap();
    settle().await;

    assert!(!late.has_live_tracks());
    assert!(carol_media.has_live_tracks());
    assert_eq!(alice.client.media().remote_stream().await, Some(carol_media.clone()));
    assert_eq!(alice.remote_surface.current(), Some(carol_media.id().to_string()));
    let state = alice.client.state().await;
    assert!(state.is_in_call);
    assert_eq!(state.remote_peer_id.as_deref(), Some("carol@example.com"));

    // Track swaps still reach the second call's connection only.
    assert!(alice.client.media().snapshot().await.has_peer_connection);
    alice.client.toggle_screen_share().await.unwrap();
    assert_eq!(second.pc.replacements(), vec![(TrackKind::Video, TrackSource::Screen)]);
    assert!(first.pc.replacements().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_late_close_from_finished_call_is_ignored() {
    let alice = signed_in_callee().await;

    let (_first, first_events, _) = answered_call(&alice, "bob@example.com").await;
    alice.client.end_call().await;
    let (second, _second_events, carol_media) = answered_call(&alice, "carol@example.com").await;

    first_events.send(CallEvent::Closed).unwrap();
    first_events.send(CallEvent::Errored("ICE failed".to_string())).unwrap();
    drop(first_events);
    settle().await;

    let state = alice.client.state().await;
    assert!(state.is_in_call);
    assert_eq!(state.remote_peer_id.as_deref(), Some("carol@example.com"));
    assert_eq!(state.error, None);
    assert!(!second.closed.load(Ordering::Acquire));
    assert!(carol_media.has_live_tracks());
    assert_eq!(alice.client.media().remote_stream().await, Some(carol_media));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_call_object_ends_the_call() {
    let alice = signed_in_callee().await;

    let (_call, events, media) = answered_call(&alice, "bob@example.com").await;
    drop(events);
    settle().await;

    let state = alice.client.state().await;
    assert!(!state.is_in_call);
    assert_eq!(state.remote_peer_id, None);
    assert!(!media.has_live_tracks());
}
