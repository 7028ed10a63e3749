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

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONNECT_TIMEOUT_MS, DEFAULT_ICE_SERVERS, ERROR_DISPLAY_MS, RECONNECT_DELAY_MS,
    RINGING_TIMEOUT_MS,
};

/// One candidate signaling service. Candidates are tried in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingServer {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub secure: bool,
    /// Shown in the connection status, e.g. "Connected via PeerJS Official".
    pub name: String,
}

impl SignalingServer {
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Options struct for constructing a client via
/// [CallOrchestrator::new](crate::CallOrchestrator::new).
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Ordered fallback list; at least two entries are recommended.
    pub signaling_servers: Vec<SignalingServer>,

    /// STUN/TURN URLs handed to every peer connection for NAT traversal.
    pub ice_servers: Vec<String>,

    /// How long a single signaling endpoint gets to open a session.
    pub connect_timeout_ms: u64,

    /// Delay before reconnecting after an unexpected drop.
    pub reconnect_delay_ms: u64,

    /// An unanswered outgoing call is cancelled after this long.
    pub ringing_timeout_ms: u64,

    /// How long an error message stays visible.
    pub error_display_ms: u64,

    /// Start the camera preview right after signing in.
    pub acquire_preview_on_login: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            signaling_servers: vec![
                SignalingServer {
                    host: "0.peerjs.com".to_string(),
                    port: 443,
                    path: "/".to_string(),
                    secure: true,
                    name: "PeerJS Official".to_string(),
                },
                SignalingServer {
                    host: "peerjs-server.herokuapp.com".to_string(),
                    port: 443,
                    path: "/".to_string(),
                    secure: true,
                    name: "Heroku Server".to_string(),
                },
            ],
            ice_servers: DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            ringing_timeout_ms: RINGING_TIMEOUT_MS,
            error_display_ms: ERROR_DISPLAY_MS,
            acquire_preview_on_login: true,
        }
    }
}

impl ClientOptions {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
