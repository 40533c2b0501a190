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

use async_trait::async_trait;
use classroom_types::{MediaKind, QualityTier};

use crate::config::{AudioProfile, MediaProfiles, VideoProfile};
use crate::errors::MediaError;

/// Constraints handed to the device layer for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackConstraints {
    Video(VideoProfile),
    Audio(AudioProfile),
}

impl TrackConstraints {
    pub fn for_kind(kind: MediaKind, tier: QualityTier, profiles: &MediaProfiles) -> Self {
        match kind {
            MediaKind::Camera => TrackConstraints::Video(profiles.video_for(tier)),
            MediaKind::Microphone => TrackConstraints::Audio(profiles.audio),
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            TrackConstraints::Video(_) => MediaKind::Camera,
            TrackConstraints::Audio(_) => MediaKind::Microphone,
        }
    }

    pub fn video(&self) -> Option<&VideoProfile> {
        match self {
            TrackConstraints::Video(profile) => Some(profile),
            TrackConstraints::Audio(_) => None,
        }
    }
}

/// The platform's way of opening capture devices (`getUserMedia`, V4L2, AVFoundation, ...).
///
/// Every call to [`open`](Self::open) may show a permission prompt, so the
/// manager calls it only when the requested intent actually changes.
#[async_trait(?Send)]
pub trait CaptureBackend {
    async fn open(
        &self,
        constraints: &TrackConstraints,
    ) -> Result<Box<dyn CaptureSource>, MediaError>;
}

/// One opened device feeding one track.
pub trait CaptureSource {
    fn device_id(&self) -> &str;

    /// Mutes or unmutes the source without releasing the device.
    fn set_enabled(&mut self, enabled: bool);

    /// Reconfigures a live source in place (resolution, frame rate).
    fn apply_constraints(&mut self, constraints: &TrackConstraints) -> Result<(), MediaError>;

    /// Releases the device. Called exactly once.
    fn stop(&mut self);
}
