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

//! Seams between the call client and whatever actually moves signaling
//! messages and media.
//!
//! A backend hands out a [`PeerLink`] per registration attempt: a handle to
//! the peer plus the channel its events arrive on. Calls follow the same
//! shape with [`CallLink`]. Nothing here blocks; results come back as events.

use std::fmt;
use std::sync::Arc;

use peercall_types::{MediaStream, PeerId, SignalingError};
use tokio::sync::mpsc;

use crate::config::SignalingServer;
use crate::media::PeerConnection;

/// Lifecycle and inbound-call events of one registered peer.
#[derive(Debug)]
pub enum PeerEvent {
    /// Registration succeeded under the given identifier.
    Open(PeerId),
    /// The link to the signaling service dropped; the peer can reconnect.
    Disconnected,
    /// The peer is gone for good.
    Closed,
    Error(SignalingError),
    IncomingCall(CallLink),
}

/// Events of a single media call.
#[derive(Debug)]
pub enum CallEvent {
    /// The remote side's media arrived.
    StreamReceived(MediaStream),
    Closed,
    Errored(String),
}

/// Factory for peers registered with one signaling service.
pub trait SignalingBackend: Send + Sync {
    /// Starts registering with `server`, asking for `id` when given.
    ///
    /// An `Err` means the attempt could not even be started; every later
    /// outcome, including failure, arrives on the link's event channel.
    fn create_peer(
        &self,
        server: &SignalingServer,
        ice_servers: &[String],
        id: Option<&PeerId>,
    ) -> Result<PeerLink, SignalingError>;
}

pub trait SignalingPeer: Send + Sync {
    fn id(&self) -> Option<PeerId>;

    /// Starts a media call to `remote`, offering `stream`.
    fn call(&self, remote: &PeerId, stream: &MediaStream) -> Result<CallLink, SignalingError>;

    /// Re-establishes the link to the signaling service after a drop.
    fn reconnect(&self);

    /// Unregisters and closes every call. Idempotent.
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

pub trait MediaCall: Send + Sync {
    fn remote_peer(&self) -> PeerId;

    /// Accepts an inbound call, offering `stream` in return.
    fn answer(&self, stream: &MediaStream);

    /// Idempotent.
    fn close(&self);

    /// The underlying connection, once negotiation has created one.
    fn peer_connection(&self) -> Option<Arc<dyn PeerConnection>>;
}

pub struct PeerLink {
    pub peer: Arc<dyn SignalingPeer>,
    pub events: mpsc::UnboundedReceiver<PeerEvent>,
}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.peer.id())
            .finish_non_exhaustive()
    }
}

pub struct CallLink {
    pub call: Arc<dyn MediaCall>,
    pub events: mpsc::UnboundedReceiver<CallEvent>,
}

impl fmt::Debug for CallLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLink")
            .field("remote", &self.call.remote_peer())
            .finish_non_exhaustive()
    }
}
