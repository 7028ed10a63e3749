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

//! Capture devices, render surfaces and peer connections that live entirely
//! in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use peercall_types::{MediaStream, MediaTrack, TrackKind, TrackSource};

use crate::media::{
    CaptureEnvironment, MediaConstraints, MediaDevices, MediaSurface, PeerConnection,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct DeviceState {
    camera_denied: Option<String>,
    display_denied: Option<String>,
    system_audio: bool,
    environment: CaptureEnvironment,
    prompt_delay_ms: u64,
    user_media_requests: usize,
    display_media_requests: usize,
    issued: Vec<MediaTrack>,
}

/// Hands out synthetic camera, microphone and screen tracks and remembers
/// every track it issued.
#[derive(Default)]
pub struct SyntheticMediaDevices {
    state: Mutex<DeviceState>,
}

impl SyntheticMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses camera/microphone requests with `reason` until [allow_camera](Self::allow_camera).
    pub fn deny_camera(&self, reason: impl Into<String>) {
        lock(&self.state).camera_denied = Some(reason.into());
    }

    pub fn allow_camera(&self) {
        lock(&self.state).camera_denied = None;
    }

    pub fn deny_display(&self, reason: impl Into<String>) {
        lock(&self.state).display_denied = Some(reason.into());
    }

    /// Whether screen captures include system audio.
    pub fn set_system_audio(&self, enabled: bool) {
        lock(&self.state).system_audio = enabled;
    }

    pub fn set_environment(&self, environment: CaptureEnvironment) {
        lock(&self.state).environment = environment;
    }

    /// Time camera/microphone requests wait before answering, like a
    /// permission prompt the user has not clicked yet.
    pub fn set_prompt_delay(&self, delay_ms: u64) {
        lock(&self.state).prompt_delay_ms = delay_ms;
    }

    pub fn user_media_requests(&self) -> usize {
        lock(&self.state).user_media_requests
    }

    pub fn display_media_requests(&self) -> usize {
        lock(&self.state).display_media_requests
    }

    /// Issued tracks that have not been stopped or ended.
    pub fn live_tracks(&self) -> Vec<MediaTrack> {
        lock(&self.state)
            .issued
            .iter()
            .filter(|t| t.is_live())
            .cloned()
            .collect()
    }

    /// Ends every live screen capture as the operating system's
    /// "stop sharing" control would. Returns how many tracks ended.
    pub fn end_screen_capture(&self) -> usize {
        self.live_tracks()
            .iter()
            .filter(|t| matches!(t.source(), TrackSource::Screen | TrackSource::SystemAudio))
            .filter(|t| t.end_from_source())
            .count()
    }

    fn issue(&self, tracks: Vec<MediaTrack>) -> MediaStream {
        lock(&self.state).issued.extend(tracks.iter().cloned());
        MediaStream::new(tracks)
    }
}

#[async_trait]
impl MediaDevices for SyntheticMediaDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> anyhow::Result<MediaStream> {
        let delay_ms = {
            let mut state = lock(&self.state);
            state.user_media_requests += 1;
            state.prompt_delay_ms
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if let Some(reason) = &lock(&self.state).camera_denied {
            bail!("{reason}");
        }

        let mut tracks = Vec::new();
        if let Some(video) = &constraints.video {
            tracks.push(MediaTrack::new(
                TrackSource::Camera,
                format!("Synthetic camera {}x{}", video.ideal_width, video.ideal_height),
            ));
        }
        if constraints.audio.is_some() {
            tracks.push(MediaTrack::new(TrackSource::Microphone, "Synthetic microphone"));
        }
        if tracks.is_empty() {
            return Err(anyhow!("no media kinds requested"));
        }
        Ok(self.issue(tracks))
    }

    async fn get_display_media(
        &self,
        constraints: &MediaConstraints,
    ) -> anyhow::Result<MediaStream> {
        let system_audio = {
            let mut state = lock(&self.state);
            state.display_media_requests += 1;
            if let Some(reason) = &state.display_denied {
                bail!("{reason}");
            }
            state.system_audio && constraints.audio.is_some()
        };
        let mut tracks = vec![MediaTrack::new(TrackSource::Screen, "Synthetic screen")];
        if system_audio {
            tracks.push(MediaTrack::new(TrackSource::SystemAudio, "Synthetic system audio"));
        }
        Ok(self.issue(tracks))
    }

    fn capture_environment(&self) -> CaptureEnvironment {
        lock(&self.state).environment
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    Attach(String),
    Detach,
}

/// A render surface that only records what it was asked to show.
#[derive(Default)]
pub struct RecordingSurface {
    ops: Mutex<Vec<SurfaceOp>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        lock(&self.ops).clone()
    }

    /// Id of the stream currently shown, if any.
    pub fn current(&self) -> Option<String> {
        match lock(&self.ops).last() {
            Some(SurfaceOp::Attach(id)) => Some(id.clone()),
            _ => None,
        }
    }
}

impl MediaSurface for RecordingSurface {
    fn attach(&self, stream: &MediaStream) {
        lock(&self.ops).push(SurfaceOp::Attach(stream.id().to_string()));
    }

    fn detach(&self) {
        lock(&self.ops).push(SurfaceOp::Detach);
    }
}

/// Outgoing track slots of one side of a loopback call.
#[derive(Default)]
pub struct LoopbackPeerConnection {
    senders: Mutex<HashMap<TrackKind, MediaTrack>>,
    replacements: Mutex<Vec<(TrackKind, TrackSource)>>,
    failing: AtomicBool,
}

impl LoopbackPeerConnection {
    pub fn with_tracks(tracks: Vec<MediaTrack>) -> Self {
        let pc = Self::default();
        pc.set_senders(tracks);
        pc
    }

    pub fn set_senders(&self, tracks: Vec<MediaTrack>) {
        let mut senders = lock(&self.senders);
        for track in tracks {
            senders.entry(track.kind()).or_insert(track);
        }
    }

    pub fn sender(&self, kind: TrackKind) -> Option<MediaTrack> {
        lock(&self.senders).get(&kind).cloned()
    }

    /// Every successful replacement, oldest first.
    pub fn replacements(&self) -> Vec<(TrackKind, TrackSource)> {
        lock(&self.replacements).clone()
    }

    /// Makes later replacements fail.
    pub fn fail_replacements(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

#[async_trait]
impl PeerConnection for LoopbackPeerConnection {
    async fn replace_track(&self, kind: TrackKind, track: &MediaTrack) -> anyhow::Result<bool> {
        if self.failing.load(Ordering::Acquire) {
            bail!("replaceTrack rejected");
        }
        let mut senders = lock(&self.senders);
        let Some(slot) = senders.get_mut(&kind) else {
            return Ok(false);
        };
        *slot = track.clone();
        lock(&self.replacements).push((kind, track.source()));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denied_camera_still_counts_request() {
        let devices = SyntheticMediaDevices::new();
        devices.deny_camera("Permission denied");
        let err = devices
            .get_user_media(&MediaConstraints::camera(true, true))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Permission denied");
        assert_eq!(devices.user_media_requests(), 1);
        assert!(devices.live_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_replace_track_needs_a_sender() {
        let pc = LoopbackPeerConnection::default();
        let screen = MediaTrack::new(TrackSource::Screen, "screen");
        assert!(!pc.replace_track(TrackKind::Video, &screen).await.unwrap());

        pc.set_senders(vec![MediaTrack::new(TrackSource::Camera, "cam")]);
        assert!(pc.replace_track(TrackKind::Video, &screen).await.unwrap());
        assert_eq!(pc.sender(TrackKind::Video), Some(screen));
        assert_eq!(pc.replacements(), vec![(TrackKind::Video, TrackSource::Screen)]);
    }

    #[test]
    fn test_surface_tracks_current_stream() {
        let surface = RecordingSurface::new();
        let stream = MediaStream::new(vec![]);
        surface.attach(&stream);
        assert_eq!(surface.current().as_deref(), Some(stream.id()));
        surface.detach();
        assert_eq!(surface.current(), None);
    }
}
