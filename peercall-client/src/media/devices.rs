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

//! Platform seams for capture, playback and the live peer connection.

use async_trait::async_trait;
use peercall_types::{MediaStream, MediaTrack, ScreenShareBlocker, TrackKind};

use crate::constants::{
    AUDIO_SAMPLE_RATE, SCREEN_HEIGHT, SCREEN_WIDTH, VIDEO_FRAME_RATE, VIDEO_HEIGHT,
    VIDEO_MIN_HEIGHT, VIDEO_MIN_WIDTH, VIDEO_WIDTH,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub frame_rate: Option<u32>,
    /// Prefer the front-facing camera.
    pub facing_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: Option<u32>,
}

/// What to capture. `None` for a kind means do not capture it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: Option<AudioConstraints>,
}

impl MediaConstraints {
    /// Camera and microphone for a call.
    pub fn camera(video: bool, audio: bool) -> Self {
        Self {
            video: video.then_some(VideoConstraints {
                ideal_width: VIDEO_WIDTH,
                ideal_height: VIDEO_HEIGHT,
                min_width: Some(VIDEO_MIN_WIDTH),
                min_height: Some(VIDEO_MIN_HEIGHT),
                frame_rate: Some(VIDEO_FRAME_RATE),
                facing_user: true,
            }),
            audio: audio.then_some(AudioConstraints {
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
                sample_rate: Some(AUDIO_SAMPLE_RATE),
            }),
        }
    }

    /// Display capture with system audio when the platform offers it.
    pub fn screen() -> Self {
        Self {
            video: Some(VideoConstraints {
                ideal_width: SCREEN_WIDTH,
                ideal_height: SCREEN_HEIGHT,
                min_width: None,
                min_height: None,
                frame_rate: None,
                facing_user: false,
            }),
            audio: Some(AudioConstraints {
                echo_cancellation: false,
                noise_suppression: false,
                auto_gain_control: false,
                sample_rate: None,
            }),
        }
    }
}

/// Facts about the runtime environment that decide whether display capture
/// can be attempted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureEnvironment {
    pub display_capture_supported: bool,
    pub secure_context: bool,
    pub embedded_frame: bool,
}

impl Default for CaptureEnvironment {
    fn default() -> Self {
        Self {
            display_capture_supported: true,
            secure_context: true,
            embedded_frame: false,
        }
    }
}

impl CaptureEnvironment {
    pub fn screen_share_blocker(&self) -> Option<ScreenShareBlocker> {
        if !self.display_capture_supported {
            Some(ScreenShareBlocker::Unsupported)
        } else if !self.secure_context {
            Some(ScreenShareBlocker::InsecureContext)
        } else if self.embedded_frame {
            Some(ScreenShareBlocker::EmbeddedFrame)
        } else {
            None
        }
    }
}

/// Access to capture hardware. An `Err` covers both a refused permission and
/// a missing device; the message is shown to the user.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> anyhow::Result<MediaStream>;

    async fn get_display_media(
        &self,
        constraints: &MediaConstraints,
    ) -> anyhow::Result<MediaStream>;

    fn capture_environment(&self) -> CaptureEnvironment;
}

/// A place a stream is rendered, such as the local preview or the remote view.
pub trait MediaSurface: Send + Sync {
    fn attach(&self, stream: &MediaStream);
    fn detach(&self);
}

/// The live connection carrying a call's media.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Swaps the outgoing track of `kind` without renegotiating.
    /// Returns `Ok(false)` when there is no sender of that kind.
    async fn replace_track(&self, kind: TrackKind, track: &MediaTrack) -> anyhow::Result<bool>;
}
