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

//! This crate provides a client-side (browser-free) interface to a one-to-one
//! video call over a third-party peer-to-peer signaling service.
//!
//! The platform is reached through three seams, each a trait:
//! [SignalingBackend] (the peer library), [MediaDevices] (camera, microphone
//! and screen capture) and [MediaSurface] (where streams are rendered). The
//! [loopback] module implements all of them in memory.
//!
//! # Outline of usage
//!
//! For more detailed documentation see the doc for each struct.
//!
//! ## Client creation and sign-in:
//! ```no_run
//! # async fn run() -> Result<(), peercall_types::CallError> {
//! use std::sync::Arc;
//! use peercall_client::loopback::{LoopbackHub, RecordingSurface, SyntheticMediaDevices};
//! use peercall_client::{CallOrchestrator, ClientOptions};
//!
//! let client = CallOrchestrator::new(
//!     ClientOptions::default(),
//!     Arc::new(LoopbackHub::new()),
//!     Arc::new(SyntheticMediaDevices::new()),
//!     Arc::new(RecordingSurface::new()),
//!     Arc::new(RecordingSurface::new()),
//! );
//! client.login("jane.doe@example.com").await?;
//! println!("{}", client.status_text()); // "Connected via PeerJS Official"
//! # Ok(())
//! # }
//! ```
//!
//! ## Calls:
//! ```no_run
//! # use peercall_types::CallError;
//! # async fn run(client: peercall_client::CallOrchestrator) -> Result<(), CallError> {
//! client.place_call("bob@x.com").await?;   // rings for up to 40 s
//! client.cancel_outgoing_call().await;
//!
//! client.accept_call().await?;             // or reject_call()
//! client.toggle_audio().await;
//! client.toggle_screen_share().await?;
//! client.end_call().await;                 // the local preview keeps running
//! client.logout().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Events:
//! ```no_run
//! # async fn run(client: peercall_client::CallOrchestrator) {
//! use peercall_client::ClientEvent;
//!
//! let mut events = client.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let ClientEvent::IncomingCall(from) = event {
//!         println!("{from} is calling");
//!     }
//! }
//! # }
//! ```

mod client;
mod config;
mod constants;
mod event_bus;
mod events;
pub mod loopback;
mod media;
pub mod platform;
pub mod self_view;
mod signaling;

pub use client::{CallDirection, CallOrchestrator, CallPhase, CallSession, CallState};
pub use config::{ClientOptions, SignalingServer};
pub use constants::*;
pub use event_bus::{EventBus, EVENT_BUS_CAPACITY};
pub use events::{CallEndReason, ClientEvent};
pub use media::{
    AudioConstraints, CaptureEnvironment, MediaConstraints, MediaDevices, MediaStreamController,
    MediaStreamSet, MediaSurface, PeerConnection, VideoConstraints,
};
pub use signaling::{
    CallEvent, CallLink, ConnectionState, MediaCall, PeerEvent, PeerLink, SessionNotice,
    SignalingBackend, SignalingPeer, SignalingSessionManager,
};
