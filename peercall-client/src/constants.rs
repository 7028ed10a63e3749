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

// hd camera resolution, vga minimum
pub const VIDEO_WIDTH: u32 = 1280u32;
pub const VIDEO_HEIGHT: u32 = 720u32;
pub const VIDEO_MIN_WIDTH: u32 = 640u32;
pub const VIDEO_MIN_HEIGHT: u32 = 480u32;
pub const VIDEO_FRAME_RATE: u32 = 30u32;

pub const SCREEN_WIDTH: u32 = 1920u32;
pub const SCREEN_HEIGHT: u32 = 1080u32;

pub const AUDIO_SAMPLE_RATE: u32 = 44100u32;

pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const RECONNECT_DELAY_MS: u64 = 3_000;
pub const RINGING_TIMEOUT_MS: u64 = 40_000;
pub const ERROR_DISPLAY_MS: u64 = 5_000;

pub const DEFAULT_ICE_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:global.stun.twilio.com:3478",
];
