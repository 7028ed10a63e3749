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

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_broadcast::Receiver;
use peercall_client::loopback::{LoopbackHub, RecordingSurface, SyntheticMediaDevices};
use peercall_client::{CallOrchestrator, ClientEvent, ClientOptions, SignalingServer};

pub const PRIMARY: &str = "alpha.signal.test";
pub const BACKUP: &str = "beta.signal.test";

pub fn server(host: &str, name: &str) -> SignalingServer {
    SignalingServer {
        host: host.to_string(),
        port: 443,
        path: "/".to_string(),
        secure: true,
        name: name.to_string(),
    }
}

/// Default timings with two loopback servers, "Alpha" first.
pub fn test_options() -> ClientOptions {
    ClientOptions {
        signaling_servers: vec![server(PRIMARY, "Alpha"), server(BACKUP, "Beta")],
        ..ClientOptions::default()
    }
}

/// Lets spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Advances paused time by `ms` and lets the woken tasks run.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}

pub fn drain(rx: &mut Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub struct TestClient {
    pub client: CallOrchestrator,
    pub devices: Arc<SyntheticMediaDevices>,
    pub local_surface: Arc<RecordingSurface>,
    pub remote_surface: Arc<RecordingSurface>,
    pub events: Receiver<ClientEvent>,
}

impl TestClient {
    pub fn new(hub: &LoopbackHub, options: ClientOptions) -> Self {
        let devices = Arc::new(SyntheticMediaDevices::new());
        let local_surface = Arc::new(RecordingSurface::new());
        let remote_surface = Arc::new(RecordingSurface::new());
        let client = CallOrchestrator::new(
            options,
            Arc::new(hub.clone()),
            devices.clone(),
            local_surface.clone(),
            remote_surface.clone(),
        );
        let events = client.subscribe();
        Self {
            client,
            devices,
            local_surface,
            remote_surface,
            events,
        }
    }

    pub fn events(&mut self) -> Vec<ClientEvent> {
        drain(&mut self.events)
    }
}

/// Two signed-in clients on one hub.
pub async fn signed_in_pair(hub: &LoopbackHub) -> (TestClient, TestClient) {
    let alice = TestClient::new(hub, test_options());
    let bob = TestClient::new(hub, test_options());
    alice
        .client
        .login("alice@example.com")
        .await
        .expect("alice signs in");
    bob.client.login("bob@example.com").await.expect("bob signs in");
    settle().await;
    (alice, bob)
}
