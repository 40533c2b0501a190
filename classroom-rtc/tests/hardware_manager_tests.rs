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

//! Integration tests for the hardware resource manager.

mod common;

use classroom_rtc::{
    CaptureIntent, MediaError, MediaKind, QualityTier, SessionEvent, TrackConstraints,
    VideoProfile,
};
use common::{drain, hardware};

const BOTH: CaptureIntent = CaptureIntent {
    want_camera: true,
    want_microphone: true,
};
const CAMERA_ONLY: CaptureIntent = CaptureIntent {
    want_camera: true,
    want_microphone: false,
};

#[tokio::test]
async fn test_same_intent_reuses_handle_without_new_request() {
    let (hardware, backend, _events) = hardware();
    let first = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    assert_eq!(backend.open_calls(), 2);

    let second = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(backend.open_calls(), 2);
    assert!(first.is_live());
}

#[tokio::test]
async fn test_same_intent_reenables_tracks() {
    let (hardware, _backend, _events) = hardware();
    let handle = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    hardware.set_track_enabled(MediaKind::Microphone, false);
    assert!(!handle.track(MediaKind::Microphone).unwrap().is_enabled());

    hardware.acquire(BOTH, false).await.unwrap();
    assert!(handle.track(MediaKind::Microphone).unwrap().is_enabled());
}

#[tokio::test]
async fn test_empty_intent_releases_everything() {
    let (hardware, backend, events) = hardware();
    let mut rx = events.subscribe();
    let handle = hardware.acquire(BOTH, false).await.unwrap().unwrap();

    let result = hardware.acquire(CaptureIntent::NONE, false).await.unwrap();
    assert!(result.is_none());
    assert!(hardware.local_media().is_none());
    assert!(!handle.is_live());
    assert_eq!(backend.live_count(MediaKind::Camera), 0);
    assert_eq!(backend.live_count(MediaKind::Microphone), 0);
    assert_eq!(
        drain(&mut rx),
        vec![
            SessionEvent::LocalMediaAcquired {
                intent: BOTH,
                tier: QualityTier::Standard
            },
            SessionEvent::LocalMediaReleased,
        ]
    );
}

#[tokio::test]
async fn test_new_intent_replaces_previous_handle() {
    let (hardware, backend, _events) = hardware();
    let old = hardware.acquire(CAMERA_ONLY, false).await.unwrap().unwrap();
    let new = hardware.acquire(BOTH, false).await.unwrap().unwrap();

    assert!(!old.ptr_eq(&new));
    assert!(!old.is_live());
    assert!(new.is_live());
    assert_eq!(new.tracks().len(), 2);
    assert_eq!(backend.live_count(MediaKind::Camera), 1);
    assert_eq!(backend.live_count(MediaKind::Microphone), 1);
    assert_eq!(hardware.satisfied_intent(), Some(BOTH));
}

#[tokio::test]
async fn test_narrowing_intent_never_opens_camera_twice() {
    let (hardware, backend, _events) = hardware();
    let old = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    let camera = old.track(MediaKind::Camera).unwrap().clone();

    let new = hardware.acquire(CAMERA_ONLY, false).await.unwrap().unwrap();
    assert_eq!(backend.max_live(MediaKind::Camera), 1);
    assert_eq!(backend.live_count(MediaKind::Camera), 1);
    assert_eq!(backend.live_count(MediaKind::Microphone), 0);
    assert_eq!(backend.open_calls(), 2);
    assert!(new.track(MediaKind::Camera).unwrap().ptr_eq(&camera));
    assert!(camera.is_live());
    assert!(new.track(MediaKind::Microphone).is_none());
    assert!(!old.is_live());
}

#[tokio::test]
async fn test_widening_intent_opens_only_the_missing_kind() {
    let (hardware, backend, _events) = hardware();
    hardware.acquire(CAMERA_ONLY, false).await.unwrap();
    let new = hardware.acquire(BOTH, false).await.unwrap().unwrap();

    assert_eq!(backend.max_live(MediaKind::Camera), 1);
    assert_eq!(backend.open_calls(), 2);
    let kinds: Vec<MediaKind> = new.tracks().iter().map(|t| t.kind()).collect();
    assert_eq!(kinds, vec![MediaKind::Camera, MediaKind::Microphone]);
}

#[tokio::test]
async fn test_carried_track_is_retuned_for_new_tier() {
    let (hardware, backend, _events) = hardware();
    hardware.acquire(BOTH, false).await.unwrap();
    let new = hardware.acquire(CAMERA_ONLY, true).await.unwrap().unwrap();

    assert_eq!(new.tier(), QualityTier::Constrained);
    assert_eq!(backend.max_live(MediaKind::Camera), 1);
    assert_eq!(
        new.track(MediaKind::Camera).unwrap().constraints(),
        backend.last_constraints(MediaKind::Camera).unwrap()
    );
    assert_eq!(
        backend
            .last_constraints(MediaKind::Camera)
            .and_then(|c| c.video().map(|v| v.frame_rate)),
        Some(15)
    );
}

#[tokio::test]
async fn test_permission_denied_leaves_nothing_held() {
    let (hardware, backend, events) = hardware();
    let mut rx = events.subscribe();
    backend.deny_permission(MediaKind::Microphone);

    let err = hardware.acquire(BOTH, false).await.unwrap_err();
    assert!(matches!(err, MediaError::PermissionDenied { kind: MediaKind::Microphone, .. }));
    assert!(hardware.local_media().is_none());
    // The camera opened before the microphone failed and must have been stopped
    assert_eq!(backend.live_count(MediaKind::Camera), 0);
    assert_eq!(drain(&mut rx), vec![SessionEvent::HardwareError(err)]);
}

#[tokio::test]
async fn test_failure_releases_previous_handle_too() {
    let (hardware, backend, _events) = hardware();
    let old = hardware.acquire(CAMERA_ONLY, false).await.unwrap().unwrap();
    backend.make_unavailable(MediaKind::Microphone);

    let err = hardware.acquire(BOTH, false).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!old.is_live());
    assert!(hardware.local_media().is_none());
    assert_eq!(backend.live_count(MediaKind::Camera), 0);

    backend.restore(MediaKind::Microphone);
    let retried = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    assert!(retried.is_live());
}

#[tokio::test]
async fn test_concurrent_acquisitions_are_serialized() {
    let (hardware, backend, _events) = hardware();
    let (first, second) = futures::join!(
        hardware.acquire(CAMERA_ONLY, false),
        hardware.acquire(BOTH, false)
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(backend.max_in_flight(), 1);
    assert_eq!(hardware.satisfied_intent(), Some(BOTH));
    assert_eq!(backend.live_count(MediaKind::Camera), 1);
    assert_eq!(backend.live_count(MediaKind::Microphone), 1);
}

#[tokio::test]
async fn test_toggle_without_handle_is_noop() {
    let (hardware, backend, events) = hardware();
    let mut rx = events.subscribe();
    hardware.set_track_enabled(MediaKind::Camera, true);
    assert!(hardware.local_media().is_none());
    assert_eq!(backend.open_calls(), 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_toggle_flips_enablement_only() {
    let (hardware, backend, _events) = hardware();
    let handle = hardware.acquire(BOTH, false).await.unwrap().unwrap();

    hardware.set_track_enabled(MediaKind::Camera, false);
    let camera = handle.track(MediaKind::Camera).unwrap();
    assert!(!camera.is_enabled());
    assert!(camera.is_live());
    assert_eq!(backend.source_enabled(MediaKind::Camera), Some(false));
    assert_eq!(backend.open_calls(), 2);
    assert_eq!(hardware.satisfied_intent(), Some(BOTH));
}

#[tokio::test]
async fn test_background_round_trip_restores_exact_state() {
    let (hardware, _backend, events) = hardware();
    let handle = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    hardware.set_track_enabled(MediaKind::Microphone, false);
    let mut rx = events.subscribe();

    hardware.suspend_video_for_background();
    assert!(!handle.track(MediaKind::Camera).unwrap().is_enabled());
    assert!(!handle.track(MediaKind::Microphone).unwrap().is_enabled());

    hardware.resume_video_for_foreground();
    assert!(handle.track(MediaKind::Camera).unwrap().is_enabled());
    assert!(!handle.track(MediaKind::Microphone).unwrap().is_enabled());
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::VideoSuspended, SessionEvent::VideoResumed]
    );
}

#[tokio::test]
async fn test_resume_keeps_camera_the_user_turned_off() {
    let (hardware, _backend, _events) = hardware();
    let handle = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    hardware.set_track_enabled(MediaKind::Camera, false);

    hardware.suspend_video_for_background();
    hardware.resume_video_for_foreground();
    assert!(!handle.track(MediaKind::Camera).unwrap().is_enabled());
}

#[tokio::test]
async fn test_camera_toggle_while_suspended_applies_on_resume() {
    let (hardware, _backend, _events) = hardware();
    let handle = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    hardware.set_track_enabled(MediaKind::Camera, false);
    hardware.suspend_video_for_background();

    hardware.set_track_enabled(MediaKind::Camera, true);
    assert!(!handle.track(MediaKind::Camera).unwrap().is_enabled());

    hardware.resume_video_for_foreground();
    assert!(handle.track(MediaKind::Camera).unwrap().is_enabled());
}

#[tokio::test]
async fn test_constrained_flag_retunes_in_place() {
    let (hardware, backend, events) = hardware();
    let handle = hardware.acquire(BOTH, false).await.unwrap().unwrap();
    assert_eq!(handle.tier(), QualityTier::Standard);
    let mut rx = events.subscribe();

    let same = hardware.acquire(BOTH, true).await.unwrap().unwrap();
    assert!(same.ptr_eq(&handle));
    assert_eq!(hardware.tier(), Some(QualityTier::Constrained));
    assert_eq!(backend.open_calls(), 2);
    let constrained = TrackConstraints::Video(VideoProfile {
        width: 640,
        height: 360,
        frame_rate: 15,
    });
    assert_eq!(backend.last_constraints(MediaKind::Camera), Some(constrained));
    assert_eq!(handle.track(MediaKind::Camera).unwrap().constraints(), constrained);
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::QualityTierChanged(QualityTier::Constrained)]
    );
}

#[tokio::test]
async fn test_constrained_acquisition_uses_constrained_ceiling() {
    let (hardware, backend, _events) = hardware();
    hardware.acquire(CAMERA_ONLY, true).await.unwrap();
    let video = backend.last_constraints(MediaKind::Camera).unwrap();
    assert_eq!(video.video().map(|v| (v.width, v.height, v.frame_rate)), Some((640, 360, 15)));
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let (hardware, _backend, events) = hardware();
    hardware.acquire(BOTH, false).await.unwrap();
    let mut rx = events.subscribe();

    hardware.release().await;
    hardware.release().await;
    assert!(hardware.local_media().is_none());
    assert_eq!(drain(&mut rx), vec![SessionEvent::LocalMediaReleased]);
}
