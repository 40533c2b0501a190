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

use serde::{Deserialize, Serialize};
use std::fmt;

/// The caller's desired hardware state.
///
/// Two intents are equivalent when both flags match; the hardware manager
/// only goes back to the device when the requested intent differs from the
/// one it currently satisfies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureIntent {
    pub want_camera: bool,
    pub want_microphone: bool,
}

impl CaptureIntent {
    pub const NONE: CaptureIntent = CaptureIntent {
        want_camera: false,
        want_microphone: false,
    };

    pub fn new(want_camera: bool, want_microphone: bool) -> Self {
        Self {
            want_camera,
            want_microphone,
        }
    }

    /// True when neither device is wanted.
    pub fn is_empty(&self) -> bool {
        !self.want_camera && !self.want_microphone
    }

    pub fn wants(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Camera => self.want_camera,
            MediaKind::Microphone => self.want_microphone,
        }
    }
}

/// Coarse capture profile chosen at acquisition time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Standard,
    Constrained,
}

impl QualityTier {
    /// Maps the externally owned resource-constrained flag onto a tier.
    pub fn from_constrained_flag(resource_constrained: bool) -> Self {
        if resource_constrained {
            QualityTier::Constrained
        } else {
            QualityTier::Standard
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QualityTier::Standard => write!(f, "standard"),
            QualityTier::Constrained => write!(f, "constrained"),
        }
    }
}

/// Kind of local capture device / track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Camera,
    Microphone,
}

impl MediaKind {
    /// SDP media line name for the kind.
    pub fn sdp_media(&self) -> &'static str {
        match self {
            MediaKind::Camera => "video",
            MediaKind::Microphone => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MediaKind::Camera => write!(f, "camera"),
            MediaKind::Microphone => write!(f, "microphone"),
        }
    }
}
