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

//! Error taxonomy shared by the signaling, media and call layers.
//!
//! None of these are fatal: the client catches them where they occur and turns
//! them into a short user-facing message via [`CallError::user_message`].

use serde::{Deserialize, Serialize};

/// Why screen capture cannot even be attempted in the current environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenShareBlocker {
    /// The platform exposes no display-capture API.
    Unsupported,
    /// Display capture requires a secure (https / localhost) context.
    InsecureContext,
    /// Running inside an embedded frame, where capture is policy-restricted.
    EmbeddedFrame,
}

impl std::fmt::Display for ScreenShareBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => write!(f, "screen capture is not supported here"),
            Self::InsecureContext => write!(f, "screen capture requires a secure context"),
            Self::EmbeddedFrame => write!(f, "screen capture is blocked inside an embedded frame"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CallError {
    /// Camera, microphone or screen permission refused, or the device is absent.
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),

    #[error("screen share unavailable: {0}")]
    ScreenShareUnavailable(ScreenShareBlocker),

    /// Every configured signaling endpoint failed.
    #[error("no signaling service reachable")]
    SignalingUnavailable,

    #[error("identifier already in use")]
    IdentifierInUse,

    /// The signaling service refused the session for a reason other than
    /// the network or the identifier.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("call failed: {0}")]
    MidCallFailure(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("not connected to a signaling service")]
    NotConnected,

    #[error("another call is already in progress")]
    CallInProgress,

    #[error("there is no pending incoming call")]
    NoPendingCall,
}

impl CallError {
    /// Short message suitable for display next to the call controls.
    pub fn user_message(&self) -> String {
        match self {
            Self::MediaAccessDenied(detail) => {
                format!("Could not access camera/microphone. Check the permissions. ({detail})")
            }
            Self::ScreenShareUnavailable(ScreenShareBlocker::EmbeddedFrame) => {
                "Screen sharing is blocked in embedded pages. Open the app in a new tab to share your screen."
                    .to_string()
            }
            Self::ScreenShareUnavailable(blocker) => {
                format!("Screen sharing unavailable: {blocker}.")
            }
            Self::SignalingUnavailable => {
                "All servers failed. Try again in a few minutes.".to_string()
            }
            Self::IdentifierInUse => {
                "This email is already in use. Try another email or wait a few minutes.".to_string()
            }
            Self::ConnectionFailed(reason) => format!("Could not connect: {reason}"),
            Self::PeerUnreachable(address) => format!(
                "Could not connect to {address}. Check that the email is correct and the person is online."
            ),
            Self::MidCallFailure(reason) => format!("Call error: {reason}"),
            Self::InvalidAddress(reason) => reason.clone(),
            Self::NotConnected => "Not connected. Sign in again.".to_string(),
            Self::CallInProgress => "A call is already in progress.".to_string(),
            Self::NoPendingCall => "There is no call to answer.".to_string(),
        }
    }
}

/// Error classes reported by the external signaling service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalingErrorKind {
    Network,
    ServerError,
    /// The requested identifier is already registered with the service.
    UnavailableId,
    /// The target of an outbound call is not registered.
    PeerUnavailable,
    Other(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct SignalingError {
    pub kind: SignalingErrorKind,
    pub message: String,
}

impl SignalingError {
    pub fn new(kind: SignalingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SignalingErrorKind::Network, message)
    }

    /// Recoverable errors are properties of the endpoint, so a different
    /// endpoint may succeed. Everything else is a property of the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            SignalingErrorKind::Network | SignalingErrorKind::ServerError
        )
    }
}

impl From<SignalingError> for CallError {
    fn from(err: SignalingError) -> Self {
        match err.kind {
            SignalingErrorKind::UnavailableId => CallError::IdentifierInUse,
            SignalingErrorKind::PeerUnavailable => CallError::PeerUnreachable(err.message),
            SignalingErrorKind::Network | SignalingErrorKind::ServerError => {
                CallError::SignalingUnavailable
            }
            SignalingErrorKind::Other(_) => CallError::ConnectionFailed(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classes() {
        assert!(SignalingError::network("down").is_recoverable());
        assert!(SignalingError::new(SignalingErrorKind::ServerError, "502").is_recoverable());
        assert!(!SignalingError::new(SignalingErrorKind::UnavailableId, "taken").is_recoverable());
        assert!(!SignalingError::new(SignalingErrorKind::PeerUnavailable, "x").is_recoverable());
        let other = SignalingError::new(SignalingErrorKind::Other("ssl".into()), "x");
        assert!(!other.is_recoverable());
    }

    #[test]
    fn test_signaling_error_maps_to_call_error() {
        let err: CallError = SignalingError::new(SignalingErrorKind::UnavailableId, "taken").into();
        assert_eq!(err, CallError::IdentifierInUse);

        let err: CallError =
            SignalingError::new(SignalingErrorKind::PeerUnavailable, "bob-at-x-dot-com").into();
        assert_eq!(err, CallError::PeerUnreachable("bob-at-x-dot-com".to_string()));

        let kind = SignalingErrorKind::Other("ssl-unavailable".into());
        let err: CallError = SignalingError::new(kind, "SSL unavailable").into();
        assert_eq!(err, CallError::ConnectionFailed("SSL unavailable".to_string()));
        assert_eq!(err.user_message(), "Could not connect: SSL unavailable");
    }

    #[test]
    fn test_embedded_frame_message_suggests_new_tab() {
        let err = CallError::ScreenShareUnavailable(ScreenShareBlocker::EmbeddedFrame);
        assert!(err.user_message().contains("new tab"));
        assert!(format!("{err}").contains("embedded frame"));
    }
}
