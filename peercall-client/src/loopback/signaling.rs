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

//! An in-process signaling service.
//!
//! Every [`LoopbackHub`] clone is the same service. Peers register per server
//! host, so two clients only find each other when they connected through the
//! same server. Answering a call mirrors each side's offered media to the
//! other as fresh remote tracks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::debug;
use peercall_types::{MediaStream, MediaTrack, PeerId, SignalingError, SignalingErrorKind};
use tokio::sync::mpsc;

use super::media::LoopbackPeerConnection;
use crate::config::SignalingServer;
use crate::media::PeerConnection;
use crate::signaling::{
    CallEvent, CallLink, MediaCall, PeerEvent, PeerLink, SignalingBackend, SignalingPeer,
};

/// How a server host answers registration attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerBehavior {
    #[default]
    Accept,
    /// Reports a network error after the attempt starts.
    NetworkError,
    /// Reports a server-side error after the attempt starts.
    ServerError,
    /// Refuses the session with an error that is not worth retrying elsewhere.
    Refuse,
    /// Never answers.
    Silent,
    /// Fails before the attempt starts.
    Unreachable,
}

#[derive(Default)]
struct HubState {
    behaviors: HashMap<String, ServerBehavior>,
    peers: HashMap<(String, PeerId), Weak<LoopbackPeer>>,
    attempts: Vec<String>,
    anonymous: u64,
}

impl HubState {
    fn live_peer(&self, host: &str, id: &PeerId) -> Option<Arc<LoopbackPeer>> {
        self.peers
            .get(&(host.to_string(), id.clone()))
            .and_then(Weak::upgrade)
            .filter(|peer| !peer.is_destroyed())
    }

    fn peers_named(&self, id: &PeerId) -> Vec<Arc<LoopbackPeer>> {
        self.peers
            .iter()
            .filter(|((_, peer_id), _)| peer_id == id)
            .filter_map(|(_, peer)| peer.upgrade())
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, host: &str, behavior: ServerBehavior) {
        lock(&self.state)
            .behaviors
            .insert(host.to_string(), behavior);
    }

    /// Hosts of every registration attempt, in order.
    pub fn attempts(&self) -> Vec<String> {
        lock(&self.state).attempts.clone()
    }

    pub fn is_registered(&self, host: &str, id: &PeerId) -> bool {
        lock(&self.state).live_peer(host, id).is_some()
    }

    /// Drops the signaling link of every peer registered as `id`.
    pub fn drop_connection(&self, id: &PeerId) -> usize {
        let peers = lock(&self.state).peers_named(id);
        for peer in &peers {
            peer.connected.store(false, Ordering::Release);
            peer.emit(PeerEvent::Disconnected);
        }
        peers.len()
    }

    /// Closes the session of every peer registered as `id`, as the service
    /// would when it shuts a client out.
    pub fn close_session(&self, id: &PeerId) -> usize {
        let peers = lock(&self.state).peers_named(id);
        for peer in &peers {
            peer.emit(PeerEvent::Closed);
        }
        peers.len()
    }

    /// Makes every call of `id` report an error on that peer's side.
    pub fn fail_calls(&self, id: &PeerId, reason: &str) {
        let peers = lock(&self.state).peers_named(id);
        for peer in peers {
            for pair in peer.live_calls() {
                pair.send(pair.side_of(id), CallEvent::Errored(reason.to_string()));
            }
        }
    }
}

impl SignalingBackend for LoopbackHub {
    fn create_peer(
        &self,
        server: &SignalingServer,
        _ice_servers: &[String],
        id: Option<&PeerId>,
    ) -> Result<PeerLink, SignalingError> {
        let mut hub = lock(&self.state);
        hub.attempts.push(server.host.clone());
        let behavior = hub.behaviors.get(&server.host).copied().unwrap_or_default();
        if behavior == ServerBehavior::Unreachable {
            return Err(SignalingError::network(format!(
                "cannot reach {}",
                server.host
            )));
        }

        let id = match id {
            Some(id) => id.clone(),
            None => {
                hub.anonymous += 1;
                PeerId::from_raw(format!("anonymous-{}", hub.anonymous))
            }
        };
        let (events, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(LoopbackPeer {
            hub: Arc::downgrade(&self.state),
            host: server.host.clone(),
            id: id.clone(),
            events,
            destroyed: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        });

        match behavior {
            ServerBehavior::Accept => {
                if hub.live_peer(&server.host, &id).is_some() {
                    peer.emit(PeerEvent::Error(SignalingError::new(
                        SignalingErrorKind::UnavailableId,
                        format!("ID \"{id}\" is taken"),
                    )));
                } else {
                    debug!("{} registered {id}", server.host);
                    hub.peers
                        .insert((server.host.clone(), id.clone()), Arc::downgrade(&peer));
                    peer.connected.store(true, Ordering::Release);
                    peer.emit(PeerEvent::Open(id));
                }
            }
            ServerBehavior::NetworkError => {
                peer.emit(PeerEvent::Error(SignalingError::network(
                    "Lost connection to server",
                )));
            }
            ServerBehavior::ServerError => {
                peer.emit(PeerEvent::Error(SignalingError::new(
                    SignalingErrorKind::ServerError,
                    "Could not get an ID from the server",
                )));
            }
            ServerBehavior::Refuse => {
                peer.emit(PeerEvent::Error(SignalingError::new(
                    SignalingErrorKind::Other("ssl-unavailable".to_string()),
                    "SSL unavailable",
                )));
            }
            ServerBehavior::Silent | ServerBehavior::Unreachable => {}
        }

        Ok(PeerLink { peer, events: rx })
    }
}

pub struct LoopbackPeer {
    hub: Weak<Mutex<HubState>>,
    host: String,
    id: PeerId,
    events: mpsc::UnboundedSender<PeerEvent>,
    destroyed: AtomicBool,
    connected: AtomicBool,
    calls: Mutex<Vec<Weak<CallPair>>>,
}

impl LoopbackPeer {
    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn track(&self, pair: &Arc<CallPair>) {
        let mut calls = lock(&self.calls);
        calls.retain(|call| call.strong_count() > 0);
        calls.push(Arc::downgrade(pair));
    }

    fn live_calls(&self) -> Vec<Arc<CallPair>> {
        lock(&self.calls)
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|pair| !pair.closed.load(Ordering::Acquire))
            .collect()
    }

    fn is_registered(&self) -> bool {
        let Some(hub) = self.hub.upgrade() else {
            return false;
        };
        let hub = lock(&hub);
        hub.live_peer(&self.host, &self.id)
            .is_some_and(|peer| std::ptr::eq(Arc::as_ptr(&peer), self))
    }
}

impl SignalingPeer for LoopbackPeer {
    fn id(&self) -> Option<PeerId> {
        (!self.is_destroyed()).then(|| self.id.clone())
    }

    fn call(&self, remote: &PeerId, stream: &MediaStream) -> Result<CallLink, SignalingError> {
        if self.is_destroyed() {
            return Err(SignalingError::network("peer is destroyed"));
        }
        let target = self
            .hub
            .upgrade()
            .and_then(|hub| lock(&hub).live_peer(&self.host, remote));

        let (pair, caller_rx, callee_rx) = CallPair::new(self.id.clone(), remote.clone(), stream);
        self.track(&pair);
        match target {
            Some(target) => {
                target.track(&pair);
                target.emit(PeerEvent::IncomingCall(CallLink {
                    call: Arc::new(LoopbackCall {
                        pair: pair.clone(),
                        side: Side::Callee,
                    }),
                    events: callee_rx,
                }));
            }
            None => self.emit(PeerEvent::Error(SignalingError::new(
                SignalingErrorKind::PeerUnavailable,
                format!("Could not connect to peer {remote}"),
            ))),
        }
        Ok(CallLink {
            call: Arc::new(LoopbackCall {
                pair,
                side: Side::Caller,
            }),
            events: caller_rx,
        })
    }

    fn reconnect(&self) {
        if self.is_destroyed() || !self.is_registered() {
            return;
        }
        if !self.connected.swap(true, Ordering::AcqRel) {
            self.emit(PeerEvent::Open(self.id.clone()));
        }
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            let mut hub = lock(&hub);
            let key = (self.host.clone(), self.id.clone());
            let ours = hub
                .peers
                .get(&key)
                .is_some_and(|peer| std::ptr::eq(peer.as_ptr(), self));
            if ours {
                hub.peers.remove(&key);
            }
        }
        for pair in self.live_calls() {
            pair.close();
        }
        self.connected.store(false, Ordering::Release);
        self.emit(PeerEvent::Closed);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Caller,
    Callee,
}

struct CallPair {
    caller: PeerId,
    callee: PeerId,
    offer: MediaStream,
    caller_tx: mpsc::UnboundedSender<CallEvent>,
    callee_tx: mpsc::UnboundedSender<CallEvent>,
    caller_pc: Arc<LoopbackPeerConnection>,
    callee_pc: Arc<LoopbackPeerConnection>,
    answered: AtomicBool,
    closed: AtomicBool,
}

impl CallPair {
    fn new(
        caller: PeerId,
        callee: PeerId,
        offer: &MediaStream,
    ) -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<CallEvent>,
        mpsc::UnboundedReceiver<CallEvent>,
    ) {
        let (caller_tx, caller_rx) = mpsc::unbounded_channel();
        let (callee_tx, callee_rx) = mpsc::unbounded_channel();
        let pair = Arc::new(Self {
            caller,
            callee,
            offer: offer.clone(),
            caller_tx,
            callee_tx,
            caller_pc: Arc::new(LoopbackPeerConnection::with_tracks(offer.tracks())),
            callee_pc: Arc::new(LoopbackPeerConnection::default()),
            answered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        (pair, caller_rx, callee_rx)
    }

    fn side_of(&self, id: &PeerId) -> Side {
        if *id == self.caller {
            Side::Caller
        } else {
            Side::Callee
        }
    }

    fn send(&self, side: Side, event: CallEvent) {
        let tx = match side {
            Side::Caller => &self.caller_tx,
            Side::Callee => &self.callee_tx,
        };
        let _ = tx.send(event);
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.send(Side::Caller, CallEvent::Closed);
            self.send(Side::Callee, CallEvent::Closed);
        }
    }
}

/// Copies of `stream`'s tracks as the other side would receive them.
fn mirror(stream: &MediaStream) -> MediaStream {
    MediaStream::new(
        stream
            .tracks()
            .iter()
            .map(|track| MediaTrack::remote(track.kind(), format!("remote {}", track.label())))
            .collect(),
    )
}

struct LoopbackCall {
    pair: Arc<CallPair>,
    side: Side,
}

impl MediaCall for LoopbackCall {
    fn remote_peer(&self) -> PeerId {
        match self.side {
            Side::Caller => self.pair.callee.clone(),
            Side::Callee => self.pair.caller.clone(),
        }
    }

    fn answer(&self, stream: &MediaStream) {
        let pair = &self.pair;
        if self.side != Side::Callee
            || pair.closed.load(Ordering::Acquire)
            || pair.answered.swap(true, Ordering::AcqRel)
        {
            return;
        }
        pair.callee_pc.set_senders(stream.tracks());
        pair.send(Side::Callee, CallEvent::StreamReceived(mirror(&pair.offer)));
        pair.send(Side::Caller, CallEvent::StreamReceived(mirror(stream)));
    }

    fn close(&self) {
        self.pair.close();
    }

    fn peer_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        let pc: Arc<dyn PeerConnection> = match self.side {
            Side::Caller => self.pair.caller_pc.clone(),
            Side::Callee => self.pair.callee_pc.clone(),
        };
        Some(pc)
    }
}
