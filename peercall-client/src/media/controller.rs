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

//! Sole owner of the local capture stream and the remote playback stream.
//!
//! Every operation takes the controller's lock for its whole duration, device
//! prompts included, so two overlapping requests can never each acquire a
//! camera and leak one of them.

use std::fmt;
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use peercall_types::{CallError, MediaStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::devices::{MediaConstraints, MediaDevices, MediaSurface, PeerConnection};
use crate::event_bus::EventBus;
use crate::events::ClientEvent;

pub(super) struct MediaState {
    pub(super) local: Option<MediaStream>,
    pub(super) remote: Option<MediaStream>,
    /// The remote stream as last received outside a screen share.
    pub(super) original_remote: Option<MediaStream>,
    pub(super) peer_connection: Option<Arc<dyn PeerConnection>>,
    pub(super) video_enabled: bool,
    pub(super) audio_enabled: bool,
    pub(super) screen_sharing: bool,
    /// Bumped on every share start; the end-of-capture watcher only acts on
    /// the share it was started for.
    pub(super) share_epoch: u64,
    pub(super) screen_watch: Option<JoinHandle<()>>,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            local: None,
            remote: None,
            original_remote: None,
            peer_connection: None,
            video_enabled: true,
            audio_enabled: true,
            screen_sharing: false,
            share_epoch: 0,
            screen_watch: None,
        }
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamSet {
    pub local: Option<MediaStream>,
    pub remote: Option<MediaStream>,
    pub original_remote: Option<MediaStream>,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub screen_sharing: bool,
    pub has_peer_connection: bool,
}

#[derive(Clone)]
pub struct MediaStreamController {
    pub(super) state: Arc<Mutex<MediaState>>,
    pub(super) devices: Arc<dyn MediaDevices>,
    pub(super) local_surface: Arc<dyn MediaSurface>,
    pub(super) remote_surface: Arc<dyn MediaSurface>,
    pub(super) events: EventBus,
}

impl fmt::Debug for MediaStreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamController").finish_non_exhaustive()
    }
}

/// Handle held by background tasks so they do not keep the controller alive.
pub(super) struct WeakMediaController {
    state: Weak<Mutex<MediaState>>,
    devices: Arc<dyn MediaDevices>,
    local_surface: Arc<dyn MediaSurface>,
    remote_surface: Arc<dyn MediaSurface>,
    events: EventBus,
}

impl WeakMediaController {
    pub(super) fn upgrade(&self) -> Option<MediaStreamController> {
        Some(MediaStreamController {
            state: self.state.upgrade()?,
            devices: self.devices.clone(),
            local_surface: self.local_surface.clone(),
            remote_surface: self.remote_surface.clone(),
            events: self.events.clone(),
        })
    }
}

impl MediaStreamController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        local_surface: Arc<dyn MediaSurface>,
        remote_surface: Arc<dyn MediaSurface>,
        events: EventBus,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(MediaState::default())),
            devices,
            local_surface,
            remote_surface,
            events,
        }
    }

    pub(super) fn downgrade(&self) -> WeakMediaController {
        WeakMediaController {
            state: Arc::downgrade(&self.state),
            devices: self.devices.clone(),
            local_surface: self.local_surface.clone(),
            remote_surface: self.remote_surface.clone(),
            events: self.events.clone(),
        }
    }

    pub async fn snapshot(&self) -> MediaStreamSet {
        let state = self.state.lock().await;
        MediaStreamSet {
            local: state.local.clone(),
            remote: state.remote.clone(),
            original_remote: state.original_remote.clone(),
            video_enabled: state.video_enabled,
            audio_enabled: state.audio_enabled,
            screen_sharing: state.screen_sharing,
            has_peer_connection: state.peer_connection.is_some(),
        }
    }

    pub async fn local_stream(&self) -> Option<MediaStream> {
        self.state.lock().await.local.clone()
    }

    pub async fn remote_stream(&self) -> Option<MediaStream> {
        self.state.lock().await.remote.clone()
    }

    pub async fn is_screen_sharing(&self) -> bool {
        self.state.lock().await.screen_sharing
    }

    /// Captures camera and/or microphone and makes the result the local
    /// stream, stopping whatever it replaces.
    pub async fn acquire_local_media(
        &self,
        video: bool,
        audio: bool,
    ) -> Result<MediaStream, CallError> {
        let mut state = self.state.lock().await;
        self.acquire_locked(&mut state, video, audio).await
    }

    /// Returns the current local stream, capturing camera and microphone
    /// first when there is none.
    pub async fn ensure_local_media(&self) -> Result<MediaStream, CallError> {
        let mut state = self.state.lock().await;
        if let Some(local) = state.local.as_ref().filter(|s| s.has_live_tracks()) {
            return Ok(local.clone());
        }
        self.acquire_locked(&mut state, true, true).await
    }

    async fn acquire_locked(
        &self,
        state: &mut MediaState,
        video: bool,
        audio: bool,
    ) -> Result<MediaStream, CallError> {
        debug!("Requesting user media (video: {video}, audio: {audio})");
        let stream = match self
            .devices
            .get_user_media(&MediaConstraints::camera(video, audio))
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                error!("Error accessing media devices: {e:#}");
                self.events.emit(ClientEvent::PermissionDenied(e.to_string()));
                return Err(CallError::MediaAccessDenied(e.to_string()));
            }
        };

        if state.screen_sharing {
            if let Some(watch) = state.screen_watch.take() {
                watch.abort();
            }
            state.screen_sharing = false;
            self.events.emit(ClientEvent::ScreenShareStateChange(false));
        }
        state.video_enabled = stream.first_video().is_some_and(|t| t.enabled());
        state.audio_enabled = stream.first_audio().is_some_and(|t| t.enabled());
        info!("Local media acquired ({} tracks)", stream.tracks().len());
        self.install_local(state, stream.clone());
        Ok(stream)
    }

    /// Makes `stream` the local stream, stopping tracks of the previous one
    /// that `stream` does not carry over.
    pub(super) fn install_local(&self, state: &mut MediaState, stream: MediaStream) {
        if let Some(previous) = state.local.replace(stream.clone()) {
            for track in previous.tracks() {
                if !stream.contains(&track) {
                    track.stop();
                }
            }
        }
        self.local_surface.attach(&stream);
        self.events
            .emit(ClientEvent::LocalStreamChanged(stream.id().to_string()));
    }

    /// Makes `stream` the remote stream and, when given, the call's peer
    /// connection the target of later track replacements.
    pub async fn attach_remote_stream(
        &self,
        stream: MediaStream,
        peer_connection: Option<Arc<dyn PeerConnection>>,
    ) {
        let mut state = self.state.lock().await;
        if peer_connection.is_some() {
            state.peer_connection = peer_connection;
        }
        if state.remote.as_ref() == Some(&stream) {
            return;
        }
        debug!("Attaching remote stream {}", stream.id());
        if let Some(previous) = state.remote.replace(stream.clone()) {
            if state.original_remote.as_ref() != Some(&previous) {
                previous.stop_all();
            }
        }
        if !state.screen_sharing {
            if let Some(original) = state.original_remote.replace(stream.clone()) {
                if original != stream {
                    original.stop_all();
                }
            }
        }
        self.remote_surface.attach(&stream);
        self.events.emit(ClientEvent::RemoteStreamChanged(Some(
            stream.id().to_string(),
        )));
    }

    pub async fn associate_peer_connection(&self, peer_connection: Arc<dyn PeerConnection>) {
        self.state.lock().await.peer_connection = Some(peer_connection);
    }

    /// Forgets the peer connection, but only if it is still `peer_connection`.
    pub async fn clear_peer_connection_if(&self, peer_connection: &Arc<dyn PeerConnection>) {
        let mut state = self.state.lock().await;
        let same = state.peer_connection.as_ref().is_some_and(|current| {
            std::ptr::eq(
                Arc::as_ptr(current) as *const (),
                Arc::as_ptr(peer_connection) as *const (),
            )
        });
        if same {
            state.peer_connection = None;
        }
    }

    /// Flips the local video track in place. `None` when there is nothing to
    /// toggle.
    pub async fn toggle_video(&self) -> Option<bool> {
        let mut state = self.state.lock().await;
        let Some(local) = state.local.clone() else {
            warn!("No local stream found");
            return None;
        };
        let Some(track) = local.first_video() else {
            warn!("No video track found");
            return None;
        };
        let enabled = !track.enabled();
        track.set_enabled(enabled);
        state.video_enabled = enabled;
        debug!("Video {}", if enabled { "enabled" } else { "disabled" });
        self.events.emit(ClientEvent::VideoToggled(enabled));
        Some(enabled)
    }

    pub async fn toggle_audio(&self) -> Option<bool> {
        let mut state = self.state.lock().await;
        let Some(local) = state.local.clone() else {
            warn!("No local stream found");
            return None;
        };
        let audio_tracks = local.audio_tracks();
        let Some(first) = audio_tracks.first() else {
            warn!("No audio track found");
            return None;
        };
        let enabled = !first.enabled();
        for track in &audio_tracks {
            track.set_enabled(enabled);
        }
        state.audio_enabled = enabled;
        debug!("Audio {}", if enabled { "enabled" } else { "disabled" });
        self.events.emit(ClientEvent::AudioToggled(enabled));
        Some(enabled)
    }

    /// Stops every local and remote track and resets the flags.
    pub async fn release_all(&self) {
        let mut state = self.state.lock().await;
        if let Some(watch) = state.screen_watch.take() {
            watch.abort();
        }
        let was_sharing = state.screen_sharing;
        let previous = std::mem::take(&mut *state);
        state.share_epoch = previous.share_epoch;
        drop(state);

        let had_local = previous.local.is_some();
        let had_remote = previous.remote.is_some() || previous.original_remote.is_some();
        let stopped: usize = [previous.local, previous.remote, previous.original_remote]
            .iter()
            .flatten()
            .map(MediaStream::stop_all)
            .sum();
        debug!("Released all media ({stopped} tracks stopped)");

        if had_local {
            self.local_surface.detach();
        }
        if had_remote {
            self.remote_surface.detach();
            self.events.emit(ClientEvent::RemoteStreamChanged(None));
        }
        if was_sharing {
            self.events.emit(ClientEvent::ScreenShareStateChange(false));
        }
    }

    /// Stops the remote stream and forgets the peer connection, leaving the
    /// local preview running for the next call.
    pub async fn release_remote_only(&self) {
        let mut state = self.state.lock().await;
        state.peer_connection = None;
        let remote = state.remote.take();
        let original = state.original_remote.take();
        drop(state);

        if remote.is_none() && original.is_none() {
            return;
        }
        for stream in remote.iter().chain(original.iter()) {
            stream.stop_all();
        }
        debug!("Released remote media");
        self.remote_surface.detach();
        self.events.emit(ClientEvent::RemoteStreamChanged(None));
    }

    /// Releases `stream` if it is still the remote stream.
    pub async fn release_remote_if(&self, stream: &MediaStream) {
        let is_current = self.state.lock().await.remote.as_ref() == Some(stream);
        if is_current {
            self.release_remote_only().await;
        } else {
            stream.stop_all();
        }
    }
}
