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

//! Handles for capture and playback media.
//!
//! A [`MediaTrack`] stands for one live hardware or network source and a
//! [`MediaStream`] groups tracks. Both are cheap to clone; clones share state,
//! so stopping a track through any clone stops it everywhere. Identity is the
//! generated id, never the contents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
    SystemAudio,
    Remote,
}

impl TrackSource {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackSource::Camera | TrackSource::Screen => TrackKind::Video,
            TrackSource::Microphone | TrackSource::SystemAudio => TrackKind::Audio,
            // Remote tracks are built with an explicit kind.
            TrackSource::Remote => TrackKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    /// Released by this application.
    Stopped,
    /// The source went away on its own (device unplugged, OS "stop sharing").
    Ended,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    label: String,
    enabled: AtomicBool,
    state: watch::Sender<TrackState>,
}

#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

impl MediaTrack {
    /// A live, enabled track from a local capture source.
    pub fn new(source: TrackSource, label: impl Into<String>) -> Self {
        Self::with_kind(source.kind(), source, label)
    }

    /// A live track received from the remote peer.
    pub fn remote(kind: TrackKind, label: impl Into<String>) -> Self {
        Self::with_kind(kind, TrackSource::Remote, label)
    }

    fn with_kind(kind: TrackKind, source: TrackSource, label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                source,
                label: label.into(),
                enabled: AtomicBool::new(true),
                state,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Mutes or unmutes the track without releasing the source.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Releases the source. Returns `true` only for the call that actually
    /// moved the track out of [`TrackState::Live`].
    pub fn stop(&self) -> bool {
        self.transition(TrackState::Stopped)
    }

    /// Signals that the source ended without the application asking for it.
    pub fn end_from_source(&self) -> bool {
        self.transition(TrackState::Ended)
    }

    fn transition(&self, next: TrackState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Resolves with the terminal state once the track is no longer live.
    pub async fn ended(&self) -> TrackState {
        let mut rx = self.inner.state.subscribe();
        let state = match rx.wait_for(|state| *state != TrackState::Live).await {
            Ok(state) => *state,
            // The sender lives in `inner`, which `self` keeps alive.
            Err(_) => TrackState::Stopped,
        };
        state
    }
}

#[derive(Debug)]
struct StreamInner {
    id: String,
    tracks: Mutex<Vec<MediaTrack>>,
}

#[derive(Debug, Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaStream {}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4().to_string(),
                tracks: Mutex::new(tracks),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MediaTrack>> {
        // A poisoned track list is still a valid list.
        self.inner
            .tracks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.lock().clone()
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.lock()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn first_video(&self) -> Option<MediaTrack> {
        self.lock().iter().find(|t| t.kind() == TrackKind::Video).cloned()
    }

    pub fn first_audio(&self) -> Option<MediaTrack> {
        self.lock().iter().find(|t| t.kind() == TrackKind::Audio).cloned()
    }

    pub fn contains(&self, track: &MediaTrack) -> bool {
        self.lock().iter().any(|t| t == track)
    }

    pub fn add_track(&self, track: MediaTrack) {
        let mut tracks = self.lock();
        if !tracks.iter().any(|t| *t == track) {
            tracks.push(track);
        }
    }

    pub fn remove_track(&self, track: &MediaTrack) -> bool {
        let mut tracks = self.lock();
        let before = tracks.len();
        tracks.retain(|t| t != track);
        tracks.len() != before
    }

    /// Stops every track, returning how many were still live.
    pub fn stop_all(&self) -> usize {
        self.tracks().iter().filter(|t| t.stop()).count()
    }

    pub fn has_live_tracks(&self) -> bool {
        self.lock().iter().any(MediaTrack::is_live)
    }
}
