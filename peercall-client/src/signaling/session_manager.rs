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

//! Owns the single registration with a signaling service.
//!
//! [`SignalingSessionManager::connect`] walks the configured servers in order,
//! giving each one [`ClientOptions::connect_timeout_ms`] to open a session.
//! Endpoint failures (network, server error, timeout, construction failure)
//! move on to the next server; request failures such as an identifier that is
//! already taken stop the walk. Once open, an unexpected drop schedules a
//! reconnect to the same server after [`ClientOptions::reconnect_delay_ms`].
//!
//! Every connect or destroy bumps a generation counter. Timers and event
//! pumps remember the generation they were started under and go quiet once
//! it moves on.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use peercall_types::{CallError, MediaStream, PeerId, SignalingError, SignalingErrorKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::backend::{CallLink, PeerEvent, PeerLink, SignalingBackend, SignalingPeer};
use crate::config::{ClientOptions, SignalingServer};
use crate::event_bus::EventBus;
use crate::events::ClientEvent;
use crate::platform::{self, TimeoutHandle};

/// Phase of the signaling session. The `Display` form is the status line
/// shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { server: String },
    Connected { server: String },
    /// Dropped; a reconnect to `server` is scheduled.
    ReconnectPending { server: String },
    Closed,
    Errored(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting { server } => write!(f, "Connecting to {server}..."),
            ConnectionState::Connected { server } => write!(f, "Connected via {server}"),
            ConnectionState::ReconnectPending { .. } => write!(f, "Reconnecting..."),
            ConnectionState::Closed => write!(f, "Connection closed"),
            ConnectionState::Errored(reason) => write!(f, "Connection error: {reason}"),
        }
    }
}

/// What the session forwards to the call layer.
#[derive(Debug)]
pub enum SessionNotice {
    IncomingCall(CallLink),
    /// The service could not route an outbound call.
    PeerUnavailable(SignalingError),
    /// The open session closed for good.
    Closed,
}

struct SessionInner {
    state: ConnectionState,
    peer: Option<Arc<dyn SignalingPeer>>,
    peer_id: Option<PeerId>,
    server: Option<SignalingServer>,
    generation: u64,
    pump: Option<JoinHandle<()>>,
    reconnect: Option<TimeoutHandle>,
}

impl SessionInner {
    fn server_name(&self) -> String {
        self.server
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }
}

fn lock(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_state(inner: &mut SessionInner, events: &EventBus, state: ConnectionState) {
    if inner.state != state {
        debug!("Signaling state: {} -> {}", inner.state, state);
        inner.state = state.clone();
        events.emit(ClientEvent::ConnectionStateChanged(state));
    }
}

#[derive(Clone)]
pub struct SignalingSessionManager {
    inner: Arc<Mutex<SessionInner>>,
    backend: Arc<dyn SignalingBackend>,
    options: Arc<ClientOptions>,
    events: EventBus,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl fmt::Debug for SignalingSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("SignalingSessionManager")
            .field("state", &inner.state)
            .field("peer_id", &inner.peer_id)
            .field("generation", &inner.generation)
            .finish_non_exhaustive()
    }
}

impl SignalingSessionManager {
    pub fn new(
        backend: Arc<dyn SignalingBackend>,
        options: Arc<ClientOptions>,
        events: EventBus,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                state: ConnectionState::Disconnected,
                peer: None,
                peer_id: None,
                server: None,
                generation: 0,
                pump: None,
                reconnect: None,
            })),
            backend,
            options,
            events,
            notices,
        }
    }

    /// Registers with the first server that accepts, replacing any existing
    /// session.
    pub async fn connect(&self, id: Option<&PeerId>) -> Result<PeerId, CallError> {
        let generation = {
            let mut inner = lock(&self.inner);
            self.teardown(&mut inner)
        };
        let timeout = Duration::from_millis(self.options.connect_timeout_ms);

        for server in &self.options.signaling_servers {
            {
                let mut inner = lock(&self.inner);
                if inner.generation != generation {
                    return Err(CallError::NotConnected);
                }
                set_state(
                    &mut inner,
                    &self.events,
                    ConnectionState::Connecting {
                        server: server.name.clone(),
                    },
                );
            }
            info!("Connecting to {} ({})", server.name, server.url());

            let PeerLink { peer, mut events } =
                match self
                    .backend
                    .create_peer(server, &self.options.ice_servers, id)
                {
                    Ok(link) => link,
                    Err(err) => {
                        warn!("Could not start a session on {}: {err}", server.name);
                        continue;
                    }
                };

            {
                let mut inner = lock(&self.inner);
                if inner.generation != generation {
                    drop(inner);
                    peer.destroy();
                    return Err(CallError::NotConnected);
                }
                inner.peer = Some(peer.clone());
            }

            let outcome = tokio::time::timeout(timeout, wait_for_open(&mut events)).await;

            let mut inner = lock(&self.inner);
            if inner.generation != generation {
                drop(inner);
                peer.destroy();
                return Err(CallError::NotConnected);
            }
            match outcome {
                Ok(Ok(peer_id)) => {
                    info!("Connected to {} as {peer_id}", server.name);
                    inner.peer_id = Some(peer_id.clone());
                    inner.server = Some(server.clone());
                    set_state(
                        &mut inner,
                        &self.events,
                        ConnectionState::Connected {
                            server: server.name.clone(),
                        },
                    );
                    let pump = SessionPump {
                        inner: Arc::downgrade(&self.inner),
                        events: self.events.clone(),
                        notices: self.notices.clone(),
                        reconnect_delay_ms: self.options.reconnect_delay_ms,
                        generation,
                    };
                    inner.pump = Some(platform::spawn(pump.run(events)));
                    return Ok(peer_id);
                }
                Ok(Err(err)) if err.is_recoverable() => {
                    warn!("{} failed ({err}), trying the next server", server.name);
                }
                Ok(Err(err)) => {
                    error!("{} refused the session: {err}", server.name);
                    inner.peer = None;
                    set_state(
                        &mut inner,
                        &self.events,
                        ConnectionState::Errored(err.message.clone()),
                    );
                    drop(inner);
                    peer.destroy();
                    return Err(err.into());
                }
                Err(_) => {
                    warn!(
                        "{} did not answer within {}ms, trying the next server",
                        server.name, self.options.connect_timeout_ms
                    );
                }
            }
            inner.peer = None;
            drop(inner);
            peer.destroy();
        }

        error!("All signaling servers failed");
        let mut inner = lock(&self.inner);
        if inner.generation == generation {
            set_state(
                &mut inner,
                &self.events,
                ConnectionState::Errored("all servers failed".to_string()),
            );
        }
        Err(CallError::SignalingUnavailable)
    }

    /// Tears down the session. Safe to call repeatedly or while `connect` is
    /// still walking the server list.
    pub fn destroy(&self) {
        let mut inner = lock(&self.inner);
        if inner.peer.is_some() {
            info!("Destroying signaling session");
        }
        self.teardown(&mut inner);
        set_state(&mut inner, &self.events, ConnectionState::Disconnected);
    }

    fn teardown(&self, inner: &mut SessionInner) -> u64 {
        inner.generation += 1;
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        inner.reconnect = None;
        inner.peer_id = None;
        inner.server = None;
        if let Some(peer) = inner.peer.take() {
            peer.destroy();
        }
        inner.generation
    }

    /// Starts a media call through the open session.
    pub fn call(&self, remote: &PeerId, stream: &MediaStream) -> Result<CallLink, CallError> {
        let peer = {
            let inner = lock(&self.inner);
            match (&inner.peer, &inner.peer_id) {
                (Some(peer), Some(_)) => peer.clone(),
                _ => return Err(CallError::NotConnected),
            }
        };
        debug!("Calling {remote}");
        peer.call(remote, stream).map_err(CallError::from)
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner).state.clone()
    }

    pub fn status_text(&self) -> String {
        self.state().to_string()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).state.is_connected()
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        lock(&self.inner).peer_id.clone()
    }

    /// The server the current session was opened on.
    pub fn server(&self) -> Option<SignalingServer> {
        lock(&self.inner).server.clone()
    }
}

async fn wait_for_open(
    events: &mut mpsc::UnboundedReceiver<PeerEvent>,
) -> Result<PeerId, SignalingError> {
    loop {
        match events.recv().await {
            Some(PeerEvent::Open(id)) => return Ok(id),
            Some(PeerEvent::Error(err)) => return Err(err),
            Some(PeerEvent::IncomingCall(link)) => link.call.close(),
            Some(PeerEvent::Disconnected) | Some(PeerEvent::Closed) | None => {
                return Err(SignalingError::network("session closed before it opened"))
            }
        }
    }
}

/// Drains the events of an open session.
struct SessionPump {
    inner: Weak<Mutex<SessionInner>>,
    events: EventBus,
    notices: mpsc::UnboundedSender<SessionNotice>,
    reconnect_delay_ms: u64,
    generation: u64,
}

impl SessionPump {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PeerEvent>) {
        while let Some(event) = rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        debug!("Signaling pump {} finished", self.generation);
    }

    /// Returns `false` once the session is over.
    fn handle(&self, event: PeerEvent) -> bool {
        let Some(shared) = self.inner.upgrade() else {
            return false;
        };
        let mut inner = lock(&shared);
        if inner.generation != self.generation {
            if let PeerEvent::IncomingCall(link) = event {
                link.call.close();
            }
            return false;
        }

        match event {
            PeerEvent::Open(id) => {
                info!("Signaling session re-opened as {id}");
                inner.peer_id = Some(id);
                let server = inner.server_name();
                set_state(&mut inner, &self.events, ConnectionState::Connected { server });
            }
            PeerEvent::Disconnected => {
                if inner.peer.as_ref().map_or(true, |peer| peer.is_destroyed()) {
                    return true;
                }
                warn!(
                    "Lost the signaling server, reconnecting in {}ms",
                    self.reconnect_delay_ms
                );
                let server = inner.server_name();
                set_state(
                    &mut inner,
                    &self.events,
                    ConnectionState::ReconnectPending { server },
                );
                inner.reconnect = Some(self.schedule_reconnect());
            }
            PeerEvent::Closed => {
                info!("Signaling session closed");
                inner.peer = None;
                inner.peer_id = None;
                inner.reconnect = None;
                // Detaches this task; it returns right after.
                inner.pump = None;
                set_state(&mut inner, &self.events, ConnectionState::Closed);
                drop(inner);
                let _ = self.notices.send(SessionNotice::Closed);
                return false;
            }
            PeerEvent::Error(err) => match err.kind {
                SignalingErrorKind::PeerUnavailable => {
                    drop(inner);
                    warn!("Peer unavailable: {}", err.message);
                    let _ = self.notices.send(SessionNotice::PeerUnavailable(err));
                }
                _ if err.is_recoverable() => warn!("Signaling error: {err}"),
                _ => {
                    error!("Signaling error: {err}");
                    set_state(
                        &mut inner,
                        &self.events,
                        ConnectionState::Errored(err.message),
                    );
                }
            },
            PeerEvent::IncomingCall(link) => {
                drop(inner);
                debug!("Incoming call from {}", link.call.remote_peer());
                if let Err(mpsc::error::SendError(SessionNotice::IncomingCall(link))) =
                    self.notices.send(SessionNotice::IncomingCall(link))
                {
                    link.call.close();
                }
            }
        }
        true
    }

    fn schedule_reconnect(&self) -> TimeoutHandle {
        let weak = self.inner.clone();
        let events = self.events.clone();
        let generation = self.generation;
        TimeoutHandle::new(self.reconnect_delay_ms, move || async move {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = lock(&shared);
            if inner.generation != generation {
                return;
            }
            if let Some(handle) = inner.reconnect.take() {
                handle.disarm();
            }
            let Some(peer) = inner.peer.clone() else {
                return;
            };
            if peer.is_destroyed() {
                return;
            }
            let server = inner.server_name();
            info!("Reconnecting to {server}");
            set_state(&mut inner, &events, ConnectionState::Connecting { server });
            drop(inner);
            peer.reconnect();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        let server = "PeerJS Official".to_string();
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(
            ConnectionState::Connecting {
                server: server.clone()
            }
            .to_string(),
            "Connecting to PeerJS Official..."
        );
        assert_eq!(
            ConnectionState::Connected { server }.to_string(),
            "Connected via PeerJS Official"
        );
        assert_eq!(
            ConnectionState::Errored("boom".into()).to_string(),
            "Connection error: boom"
        );
    }

    #[test]
    fn test_only_connected_counts_as_connected() {
        assert!(ConnectionState::Connected { server: "a".into() }.is_connected());
        assert!(!ConnectionState::ReconnectPending { server: "a".into() }.is_connected());
        assert!(!ConnectionState::Closed.is_connected());
    }
}
