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

//! Local/remote stream ownership and screen sharing against synthetic devices.

mod common;

use std::sync::Arc;

use async_broadcast::Receiver;
use common::{drain, settle};
use peercall_client::loopback::{LoopbackPeerConnection, RecordingSurface, SyntheticMediaDevices};
use peercall_client::{CaptureEnvironment, ClientEvent, EventBus, MediaStreamController};
use peercall_types::{
    CallError, MediaStream, MediaTrack, ScreenShareBlocker, TrackKind, TrackSource, TrackState,
};

struct Fixture {
    media: MediaStreamController,
    devices: Arc<SyntheticMediaDevices>,
    local_surface: Arc<RecordingSurface>,
    remote_surface: Arc<RecordingSurface>,
    events: Receiver<ClientEvent>,
}

fn fixture() -> Fixture {
    let devices = Arc::new(SyntheticMediaDevices::new());
    let local_surface = Arc::new(RecordingSurface::new());
    let remote_surface = Arc::new(RecordingSurface::new());
    let bus = EventBus::new();
    let events = bus.subscribe();
    let media = MediaStreamController::new(
        devices.clone(),
        local_surface.clone(),
        remote_surface.clone(),
        bus,
    );
    Fixture {
        media,
        devices,
        local_surface,
        remote_surface,
        events,
    }
}

fn remote_stream() -> MediaStream {
    MediaStream::new(vec![
        MediaTrack::remote(TrackKind::Video, "remote camera"),
        MediaTrack::remote(TrackKind::Audio, "remote microphone"),
    ])
}

/// A peer connection sending the current local tracks.
async fn connect_peer(f: &Fixture) -> Arc<LoopbackPeerConnection> {
    let local = f.media.local_stream().await.expect("local stream");
    let pc = Arc::new(LoopbackPeerConnection::with_tracks(local.tracks()));
    f.media.associate_peer_connection(pc.clone()).await;
    pc
}

#[tokio::test]
async fn test_toggles_keep_the_same_stream() {
    let f = fixture();
    let stream = f.media.acquire_local_media(true, true).await.unwrap();
    let video = stream.first_video().unwrap();

    assert_eq!(f.media.toggle_video().await, Some(false));
    assert!(!video.enabled());
    assert!(video.is_live());
    assert_eq!(f.media.toggle_video().await, Some(true));
    assert!(video.enabled());

    assert_eq!(f.media.toggle_audio().await, Some(false));
    assert!(!f.media.snapshot().await.audio_enabled);

    assert_eq!(f.media.local_stream().await, Some(stream));
    assert_eq!(f.devices.user_media_requests(), 1);
}

#[tokio::test]
async fn test_toggle_without_local_stream() {
    let f = fixture();
    assert_eq!(f.media.toggle_video().await, None);
    assert_eq!(f.media.toggle_audio().await, None);

    // Audio-only capture has nothing to toggle on the video side.
    f.media.acquire_local_media(false, true).await.unwrap();
    assert_eq!(f.media.toggle_video().await, None);
    assert!(!f.media.snapshot().await.video_enabled);
}

#[tokio::test]
async fn test_ensure_local_media_reuses_live_stream() {
    let f = fixture();
    let first = f.media.ensure_local_media().await.unwrap();
    let second = f.media.ensure_local_media().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(f.devices.user_media_requests(), 1);
    assert_eq!(f.local_surface.current().as_deref(), Some(first.id()));
}

#[tokio::test]
async fn test_reacquire_stops_previous_tracks() {
    let f = fixture();
    let first = f.media.acquire_local_media(true, true).await.unwrap();
    let second = f.media.acquire_local_media(true, true).await.unwrap();

    assert_ne!(first, second);
    assert!(!first.has_live_tracks());
    assert_eq!(f.devices.live_tracks().len(), 2);
}

#[tokio::test]
async fn test_denied_camera() {
    let mut f = fixture();
    f.devices.deny_camera("Permission denied");

    let err = f.media.acquire_local_media(true, true).await.unwrap_err();

    assert!(matches!(err, CallError::MediaAccessDenied(ref m) if m == "Permission denied"));
    assert!(drain(&mut f.events)
        .iter()
        .any(|e| matches!(e, ClientEvent::PermissionDenied(_))));
    assert_eq!(f.media.local_stream().await, None);
}

#[tokio::test]
async fn test_embedded_frame_blocks_before_capture() {
    let f = fixture();
    f.media.acquire_local_media(true, true).await.unwrap();
    f.devices.set_environment(CaptureEnvironment {
        embedded_frame: true,
        ..CaptureEnvironment::default()
    });

    let err = f.media.start_screen_share().await.unwrap_err();

    assert_eq!(
        err,
        CallError::ScreenShareUnavailable(ScreenShareBlocker::EmbeddedFrame)
    );
    assert!(err.user_message().contains("new tab"));
    assert_eq!(f.devices.display_media_requests(), 0);
    assert!(!f.media.is_screen_sharing().await);
}

#[tokio::test]
async fn test_screen_share_swaps_outgoing_video() {
    let mut f = fixture();
    let camera = f.media.acquire_local_media(true, true).await.unwrap();
    let pc = connect_peer(&f).await;

    let shared = f.media.start_screen_share().await.unwrap();

    let screen = shared.first_video().unwrap();
    assert_eq!(screen.source(), TrackSource::Screen);
    assert_eq!(pc.sender(TrackKind::Video), Some(screen.clone()));
    assert_eq!(pc.replacements(), vec![(TrackKind::Video, TrackSource::Screen)]);
    // Without system audio the microphone keeps sending.
    let mic = camera.first_audio().unwrap();
    assert!(shared.contains(&mic));
    assert!(mic.is_live());
    assert_eq!(camera.first_video().unwrap().state(), TrackState::Stopped);
    assert_eq!(f.local_surface.current().as_deref(), Some(shared.id()));
    assert!(f.media.is_screen_sharing().await);

    f.media.stop_screen_share().await.unwrap();

    assert!(!f.media.is_screen_sharing().await);
    assert_eq!(screen.state(), TrackState::Stopped);
    let restored = f.media.local_stream().await.unwrap();
    assert_eq!(
        restored.first_video().map(|t| t.source()),
        Some(TrackSource::Camera)
    );
    assert_eq!(
        pc.sender(TrackKind::Video).map(|t| t.source()),
        Some(TrackSource::Camera)
    );
    assert_eq!(
        pc.replacements(),
        vec![
            (TrackKind::Video, TrackSource::Screen),
            (TrackKind::Video, TrackSource::Camera),
            (TrackKind::Audio, TrackSource::Microphone),
        ]
    );
    let shares: Vec<bool> = drain(&mut f.events)
        .into_iter()
        .filter_map(|e| match e {
            ClientEvent::ScreenShareStateChange(on) => Some(on),
            _ => None,
        })
        .collect();
    assert_eq!(shares, vec![true, false]);
}

#[tokio::test]
async fn test_system_audio_inherits_mute() {
    let f = fixture();
    f.devices.set_system_audio(true);
    let camera = f.media.acquire_local_media(true, true).await.unwrap();
    let pc = connect_peer(&f).await;
    f.media.toggle_audio().await;

    let shared = f.media.start_screen_share().await.unwrap();

    let system_audio = shared.first_audio().unwrap();
    assert_eq!(system_audio.source(), TrackSource::SystemAudio);
    assert!(!system_audio.enabled());
    assert!(!camera.first_audio().unwrap().is_live());
    assert_eq!(
        pc.sender(TrackKind::Audio).map(|t| t.source()),
        Some(TrackSource::SystemAudio)
    );

    f.media.stop_screen_share().await.unwrap();

    let restored = f.media.local_stream().await.unwrap();
    let mic = restored.first_audio().unwrap();
    assert_eq!(mic.source(), TrackSource::Microphone);
    assert!(!mic.enabled());
    assert!(!system_audio.is_live());
    assert!(!f.media.snapshot().await.audio_enabled);
}

#[tokio::test]
async fn test_second_start_returns_current_share() {
    let f = fixture();
    f.media.acquire_local_media(true, true).await.unwrap();

    let first = f.media.start_screen_share().await.unwrap();
    let second = f.media.start_screen_share().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(f.devices.display_media_requests(), 1);
}

#[tokio::test]
async fn test_system_stop_reverts_to_camera() {
    let mut f = fixture();
    f.media.acquire_local_media(true, true).await.unwrap();
    let pc = connect_peer(&f).await;
    f.media.start_screen_share().await.unwrap();
    drain(&mut f.events);

    assert_eq!(f.devices.end_screen_capture(), 1);
    settle().await;

    assert!(!f.media.is_screen_sharing().await);
    let restored = f.media.local_stream().await.unwrap();
    assert_eq!(
        restored.first_video().map(|t| t.source()),
        Some(TrackSource::Camera)
    );
    assert_eq!(
        pc.sender(TrackKind::Video).map(|t| t.source()),
        Some(TrackSource::Camera)
    );
    assert!(drain(&mut f.events)
        .iter()
        .any(|e| matches!(e, ClientEvent::ScreenShareStateChange(false))));
}

#[tokio::test]
async fn test_failed_track_swap_keeps_camera() {
    let f = fixture();
    let camera = f.media.acquire_local_media(true, true).await.unwrap();
    let pc = connect_peer(&f).await;
    pc.fail_replacements(true);

    let err = f.media.start_screen_share().await.unwrap_err();

    assert!(matches!(err, CallError::MidCallFailure(_)));
    assert!(!f.media.is_screen_sharing().await);
    assert_eq!(f.media.local_stream().await, Some(camera.clone()));
    assert!(camera.first_video().unwrap().is_live());
    assert!(f
        .devices
        .live_tracks()
        .iter()
        .all(|t| t.source() != TrackSource::Screen));
}

#[tokio::test]
async fn test_camera_loss_after_share_releases_screen() {
    let f = fixture();
    let camera = f.media.acquire_local_media(true, true).await.unwrap();
    f.media.start_screen_share().await.unwrap();
    f.devices.deny_camera("Device in use");

    let err = f.media.stop_screen_share().await.unwrap_err();

    assert!(matches!(err, CallError::MediaAccessDenied(_)));
    assert!(!f.media.is_screen_sharing().await);
    let live = f.devices.live_tracks();
    assert!(live.iter().all(|t| t.source() != TrackSource::Screen));
    // The microphone was never part of the swap and keeps running.
    let mic = camera.first_audio().unwrap();
    assert!(live.contains(&mic));
    let rest = f.media.local_stream().await.unwrap();
    assert_eq!(rest.tracks(), vec![mic]);
}

#[tokio::test]
async fn test_remote_stream_restored_after_share() {
    let f = fixture();
    f.media.acquire_local_media(true, true).await.unwrap();
    let original = remote_stream();
    f.media.attach_remote_stream(original.clone(), None).await;
    f.media.start_screen_share().await.unwrap();

    let substitute = remote_stream();
    f.media.attach_remote_stream(substitute.clone(), None).await;
    assert!(original.has_live_tracks());
    assert_eq!(f.remote_surface.current().as_deref(), Some(substitute.id()));

    f.media.stop_screen_share().await.unwrap();

    assert_eq!(f.media.remote_stream().await, Some(original.clone()));
    assert_eq!(f.remote_surface.current().as_deref(), Some(original.id()));
    assert!(!substitute.has_live_tracks());
}

#[tokio::test]
async fn test_release_remote_only_keeps_preview() {
    let f = fixture();
    let local = f.media.acquire_local_media(true, true).await.unwrap();
    let remote = remote_stream();
    let pc = connect_peer(&f).await;
    f.media.attach_remote_stream(remote.clone(), Some(pc)).await;

    f.media.release_remote_only().await;

    let snapshot = f.media.snapshot().await;
    assert_eq!(snapshot.local, Some(local.clone()));
    assert_eq!(snapshot.remote, None);
    assert!(!snapshot.has_peer_connection);
    assert!(local.has_live_tracks());
    assert!(!remote.has_live_tracks());
    assert_eq!(f.remote_surface.current(), None);
}

#[tokio::test]
async fn test_release_all_leaves_nothing_live() {
    let f = fixture();
    f.devices.set_system_audio(true);
    f.media.acquire_local_media(true, true).await.unwrap();
    let remote = remote_stream();
    f.media.attach_remote_stream(remote.clone(), None).await;
    f.media.start_screen_share().await.unwrap();
    f.media.toggle_audio().await;

    f.media.release_all().await;

    assert!(f.devices.live_tracks().is_empty());
    assert!(!remote.has_live_tracks());
    let snapshot = f.media.snapshot().await;
    assert_eq!(snapshot.local, None);
    assert_eq!(snapshot.remote, None);
    assert!(!snapshot.screen_sharing);
    assert!(snapshot.video_enabled && snapshot.audio_enabled);
    assert_eq!(f.local_surface.current(), None);
    assert_eq!(f.remote_surface.current(), None);

    // Safe to repeat.
    f.media.release_all().await;
}
