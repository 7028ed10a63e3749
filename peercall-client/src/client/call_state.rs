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

use peercall_types::PeerId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallPhase {
    Ringing,
    /// Answered; waiting for the remote media.
    Connecting,
    Active,
}

/// The one call this client is placing, receiving or holding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSession {
    pub direction: CallDirection,
    pub phase: CallPhase,
    /// The address as the user typed it (outgoing) or as decoded from the
    /// caller's identifier (incoming).
    pub counterparty: String,
    pub remote_id: PeerId,
    pub started_at_ms: f64,
}

impl CallSession {
    pub(crate) fn outgoing(counterparty: String, remote_id: PeerId, now_ms: f64) -> Self {
        Self {
            direction: CallDirection::Outgoing,
            phase: CallPhase::Ringing,
            counterparty,
            remote_id,
            started_at_ms: now_ms,
        }
    }

    pub(crate) fn incoming(remote_id: PeerId, now_ms: f64) -> Self {
        Self {
            direction: CallDirection::Incoming,
            phase: CallPhase::Ringing,
            counterparty: remote_id.to_email(),
            remote_id,
            started_at_ms: now_ms,
        }
    }

    pub fn is_ringing(&self, direction: CallDirection) -> bool {
        self.phase == CallPhase::Ringing && self.direction == direction
    }
}

/// Everything the presentation layer renders, in one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallState {
    pub is_connected: bool,
    pub is_in_call: bool,
    pub is_video_enabled: bool,
    pub is_audio_enabled: bool,
    pub is_screen_sharing: bool,
    /// Our identifier on the signaling service.
    pub peer_id: Option<PeerId>,
    pub user_email: Option<String>,
    /// Address of the other party once the call is active.
    pub remote_peer_id: Option<String>,
    /// Address being rung.
    pub outgoing_call: Option<String>,
    /// Address of a caller waiting for an answer.
    pub incoming_call: Option<String>,
    pub error: Option<String>,
    pub status: String,
}

impl Default for CallState {
    fn default() -> Self {
        Self {
            is_connected: false,
            is_in_call: false,
            is_video_enabled: true,
            is_audio_enabled: true,
            is_screen_sharing: false,
            peer_id: None,
            user_email: None,
            remote_peer_id: None,
            outgoing_call: None,
            incoming_call: None,
            error: None,
            status: "Disconnected".to_string(),
        }
    }
}
