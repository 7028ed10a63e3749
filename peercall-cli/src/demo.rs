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

//! Scripted call between two clients sharing one loopback hub.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_broadcast::{Receiver, RecvError};
use log::info;
use peercall_client::loopback::{LoopbackHub, RecordingSurface, SyntheticMediaDevices};
use peercall_client::{CallOrchestrator, ClientEvent};

use crate::config::DemoConfig;

struct Party {
    name: &'static str,
    client: CallOrchestrator,
    devices: Arc<SyntheticMediaDevices>,
    events: Receiver<ClientEvent>,
}

impl Party {
    fn new(name: &'static str, hub: &LoopbackHub, config: &DemoConfig) -> Self {
        let devices = Arc::new(SyntheticMediaDevices::new());
        devices.set_system_audio(config.system_audio);
        let client = CallOrchestrator::new(
            config.client.clone(),
            Arc::new(hub.clone()),
            devices.clone(),
            Arc::new(RecordingSurface::new()),
            Arc::new(RecordingSurface::new()),
        );
        let events = client.subscribe();
        tokio::spawn(log_events(name, client.subscribe()));
        Self {
            name,
            client,
            devices,
            events,
        }
    }

    /// Waits for the first event `matches` accepts, skipping the rest.
    async fn wait_for<F>(
        &mut self,
        what: &str,
        timeout_ms: u64,
        mut matches: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(&ClientEvent) -> bool,
    {
        let events = &mut self.events;
        let waited = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            loop {
                match events.recv().await {
                    Ok(event) if matches(&event) => return Ok(()),
                    Ok(_) | Err(RecvError::Overflowed(_)) => continue,
                    Err(RecvError::Closed) => bail!("event bus closed"),
                }
            }
        })
        .await;
        waited.map_err(|_| anyhow!("{}: timed out waiting for {what}", self.name))?
    }
}

async fn log_events(name: &'static str, mut events: Receiver<ClientEvent>) {
    while let Ok(event) = events.recv().await {
        info!("[{name}] {event:?}");
    }
}

pub async fn run(config: DemoConfig) -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let step = config.step_timeout_ms;
    let mut caller = Party::new("caller", &hub, &config);
    let mut callee = Party::new("callee", &hub, &config);

    let caller_id = caller.client.login(&config.caller).await?;
    let callee_id = callee.client.login(&config.callee).await?;
    info!("Signed in as {caller_id} and {callee_id}");

    caller.client.place_call(&config.callee).await?;
    callee
        .wait_for("the incoming call", step, |e| {
            matches!(e, ClientEvent::IncomingCall(_))
        })
        .await?;

    callee.client.accept_call().await?;
    caller
        .wait_for("the call to connect", step, |e| {
            matches!(e, ClientEvent::CallActive(_))
        })
        .await?;
    print_state(&caller.client).await?;

    let audio = caller.client.toggle_audio().await;
    info!("Caller audio enabled: {audio:?}");

    if caller.client.toggle_screen_share().await? {
        info!("Caller is sharing the screen");
        print_state(&caller.client).await?;
        caller.client.toggle_screen_share().await?;
    }

    caller.client.end_call().await;
    callee
        .wait_for("the call to end", step, |e| {
            matches!(e, ClientEvent::CallEnded { .. })
        })
        .await?;

    caller.client.logout().await;
    callee.client.logout().await;

    for party in [&caller, &callee] {
        let live = party.devices.live_tracks().len();
        if live > 0 {
            bail!("{} still holds {live} capture tracks", party.name);
        }
    }
    info!("Demo finished, all capture released");
    Ok(())
}

async fn print_state(client: &CallOrchestrator) -> anyhow::Result<()> {
    let state = client.state().await;
    println!("{}", serde_yaml::to_string(&state)?);
    Ok(())
}
