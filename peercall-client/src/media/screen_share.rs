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

//! Switching the outgoing video between camera and screen capture.
//!
//! Starting a share swaps the tracks on the live peer connection in place, so
//! the remote side sees the new content without renegotiation. The camera is
//! only released once the swap succeeded; on failure the call keeps sending
//! the camera. A watcher on the screen track reverts to the camera when the
//! capture is ended from the operating system rather than from the app.

use log::{debug, error, info, warn};
use peercall_types::{CallError, MediaStream, MediaTrack, TrackKind, TrackSource, TrackState};

use super::controller::{MediaState, MediaStreamController};
use super::devices::MediaConstraints;
use crate::events::ClientEvent;
use crate::platform;

impl MediaStreamController {
    /// Replaces the outgoing video with a screen capture. Returns the new
    /// local stream. Calling it while already sharing returns the current one.
    pub async fn start_screen_share(&self) -> Result<MediaStream, CallError> {
        if let Some(blocker) = self.devices.capture_environment().screen_share_blocker() {
            warn!("Screen share blocked: {blocker}");
            return Err(CallError::ScreenShareUnavailable(blocker));
        }

        let mut state = self.state.lock().await;
        if state.screen_sharing {
            if let Some(local) = &state.local {
                return Ok(local.clone());
            }
        }

        let capture = self
            .devices
            .get_display_media(&MediaConstraints::screen())
            .await
            .map_err(|e| {
                error!("Error starting screen share: {e:#}");
                CallError::MediaAccessDenied(format!("could not share the screen: {e}"))
            })?;
        let Some(screen_video) = capture.first_video() else {
            capture.stop_all();
            return Err(CallError::MediaAccessDenied(
                "the screen capture has no video".to_string(),
            ));
        };
        let system_audio = capture.first_audio();
        for track in capture.tracks() {
            if track != screen_video && Some(&track) != system_audio.as_ref() {
                track.stop();
            }
        }

        let previous = state.local.clone();
        let microphone = previous.as_ref().and_then(MediaStream::first_audio);
        if let Some(audio) = &system_audio {
            audio.set_enabled(state.audio_enabled);
        }
        let outgoing_audio = system_audio.clone().or(microphone);
        let shared = MediaStream::new(
            std::iter::once(screen_video.clone())
                .chain(outgoing_audio)
                .collect(),
        );

        if let Some(pc) = state.peer_connection.clone() {
            let swapped = async {
                pc.replace_track(TrackKind::Video, &screen_video).await?;
                if let Some(audio) = &system_audio {
                    pc.replace_track(TrackKind::Audio, audio).await?;
                }
                anyhow::Ok(())
            }
            .await;
            if let Err(e) = swapped {
                error!("Could not switch the call to the screen: {e:#}");
                capture.stop_all();
                if let Some(camera) = previous.as_ref().and_then(MediaStream::first_video) {
                    if let Err(e) = pc.replace_track(TrackKind::Video, &camera).await {
                        warn!("Could not restore the camera track: {e:#}");
                    }
                }
                return Err(CallError::MidCallFailure(format!(
                    "could not switch to the screen: {e}"
                )));
            }
        }

        if let Some(previous) = &previous {
            for track in previous.video_tracks() {
                track.stop();
            }
            // System audio takes over from the microphone while sharing.
            if system_audio.is_some() {
                for track in previous.audio_tracks() {
                    track.stop();
                }
            }
        }

        state.local = Some(shared.clone());
        state.screen_sharing = true;
        state.video_enabled = true;
        state.share_epoch += 1;
        self.local_surface.attach(&shared);
        info!(
            "Screen share started ({})",
            if system_audio.is_some() {
                "with system audio"
            } else {
                "with microphone"
            }
        );
        self.events
            .emit(ClientEvent::LocalStreamChanged(shared.id().to_string()));
        self.events.emit(ClientEvent::ScreenShareStateChange(true));

        state.screen_watch = Some(self.watch_screen_track(screen_video, state.share_epoch));
        Ok(shared)
    }

    /// Goes back to camera and microphone. Does nothing when not sharing.
    pub async fn stop_screen_share(&self) -> Result<(), CallError> {
        let mut state = self.state.lock().await;
        if let Some(watch) = state.screen_watch.take() {
            watch.abort();
        }
        self.revert_to_camera(&mut state).await
    }

    fn watch_screen_track(&self, track: MediaTrack, epoch: u64) -> tokio::task::JoinHandle<()> {
        let weak = self.downgrade();
        platform::spawn(async move {
            if track.ended().await != TrackState::Ended {
                return;
            }
            let Some(controller) = weak.upgrade() else {
                return;
            };
            info!("Screen capture ended from the system, switching back to the camera");
            let mut state = controller.state.lock().await;
            if !state.screen_sharing || state.share_epoch != epoch {
                debug!("Screen share {epoch} already over");
                return;
            }
            // This task is the watcher; dropping its handle only detaches it.
            state.screen_watch = None;
            if let Err(e) = controller.revert_to_camera(&mut state).await {
                controller.events.emit(ClientEvent::Error(e.user_message()));
            }
        })
    }

    async fn revert_to_camera(&self, state: &mut MediaState) -> Result<(), CallError> {
        if !state.screen_sharing {
            return Ok(());
        }
        let shared = state.local.take();

        let camera = match self
            .devices
            .get_user_media(&MediaConstraints::camera(true, true))
            .await
        {
            Ok(camera) => camera,
            Err(e) => {
                error!("Could not get the camera back after screen share: {e:#}");
                // The screen must not stay captured either way.
                if let Some(shared) = shared {
                    let leftover: Vec<MediaTrack> = shared
                        .tracks()
                        .into_iter()
                        .filter(|t| {
                            let screen = matches!(
                                t.source(),
                                TrackSource::Screen | TrackSource::SystemAudio
                            );
                            if screen {
                                t.stop();
                            }
                            !screen && t.is_live()
                        })
                        .collect();
                    if leftover.is_empty() {
                        self.local_surface.detach();
                    } else {
                        let rest = MediaStream::new(leftover);
                        self.local_surface.attach(&rest);
                        self.events
                            .emit(ClientEvent::LocalStreamChanged(rest.id().to_string()));
                        state.local = Some(rest);
                    }
                }
                state.screen_sharing = false;
                state.video_enabled = false;
                self.events.emit(ClientEvent::ScreenShareStateChange(false));
                return Err(CallError::MediaAccessDenied(e.to_string()));
            }
        };

        for track in camera.audio_tracks() {
            track.set_enabled(state.audio_enabled);
        }
        if let Some(pc) = state.peer_connection.clone() {
            for track in [camera.first_video(), camera.first_audio()].into_iter().flatten() {
                if let Err(e) = pc.replace_track(track.kind(), &track).await {
                    warn!("Could not switch the call back to the {}: {e:#}", track.source());
                }
            }
        }
        if let Some(shared) = shared {
            shared.stop_all();
        }

        state.video_enabled = camera.first_video().is_some();
        state.local = Some(camera.clone());
        self.local_surface.attach(&camera);
        self.events
            .emit(ClientEvent::LocalStreamChanged(camera.id().to_string()));

        if let Some(original) = state.original_remote.clone() {
            if state.remote.as_ref() != Some(&original) {
                if let Some(substitute) = state.remote.replace(original.clone()) {
                    substitute.stop_all();
                }
                self.remote_surface.attach(&original);
                self.events.emit(ClientEvent::RemoteStreamChanged(Some(
                    original.id().to_string(),
                )));
            }
        }

        state.screen_sharing = false;
        info!("Screen share stopped");
        self.events.emit(ClientEvent::ScreenShareStateChange(false));
        Ok(())
    }
}
