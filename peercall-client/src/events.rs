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

//! Framework-agnostic event types for the call client.
//!
//! These events are emitted via the event bus and drive re-rendering in
//! whatever presentation layer sits on top. They describe what happened; the
//! current values are always available from
//! [`CallOrchestrator::state`](crate::CallOrchestrator::state).

use crate::signaling::ConnectionState;
use peercall_types::PeerId;

/// Why a call left the ringing or active phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallEndReason {
    /// This side hung up.
    Hangup,
    /// The remote side closed the call.
    RemoteClosed,
    /// The caller gave up before the callee answered.
    Cancelled,
    /// Nobody answered within the ringing window.
    RingTimeout,
    /// The callee declined the incoming call.
    Rejected,
    /// The call object reported an error.
    Failed,
    LoggedOut,
}

/// Events emitted by the CallOrchestrator that UI frameworks can subscribe to.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    // === Signaling Events ===
    /// The signaling session changed phase; the payload's `Display` is the status text.
    ConnectionStateChanged(ConnectionState),

    /// Signed in and registered under the given identifier.
    LoggedIn(PeerId),

    LoggedOut,

    // === Call Events ===
    /// Someone is calling; payload is their address.
    IncomingCall(String),

    /// Ringing the given address.
    OutgoingCall(String),

    /// Remote media arrived and the call is live.
    CallActive(String),

    CallEnded {
        remote: Option<String>,
        reason: CallEndReason,
    },

    // === Media Events ===
    /// The local capture stream was acquired or replaced.
    LocalStreamChanged(String),

    /// The remote playback stream was attached (`Some`) or released (`None`).
    RemoteStreamChanged(Option<String>),

    VideoToggled(bool),

    AudioToggled(bool),

    ScreenShareStateChange(bool),

    /// Media permission was denied
    PermissionDenied(String),

    // === User Messages ===
    /// A short-lived message to show to the user.
    Error(String),

    ErrorCleared,
}
