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

pub mod error;
pub mod feature_flags;
pub mod identity;
pub mod media;

pub use error::{CallError, ScreenShareBlocker, SignalingError, SignalingErrorKind};
pub use feature_flags::FeatureFlags;
pub use identity::{decode_peer_id, encode_peer_id, encode_peer_id_strict, validate_email, PeerId};
pub use media::{MediaStream, MediaTrack, TrackKind, TrackSource, TrackState};

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

impl std::fmt::Display for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TrackSource::Camera => write!(f, "camera"),
            TrackSource::Microphone => write!(f, "microphone"),
            TrackSource::Screen => write!(f, "screen"),
            TrackSource::SystemAudio => write!(f, "system-audio"),
            TrackSource::Remote => write!(f, "remote"),
        }
    }
}
