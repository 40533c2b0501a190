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

use classroom_types::{CaptureIntent, MediaKind};

//
// TrackState holds the enablement the user asked for, separately from the background
// suspension, so that a foreground transition can restore exactly what was there before.
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct TrackState {
    camera_wanted: bool,
    microphone_wanted: bool,
    video_suspended: bool,
}

impl TrackState {
    // Adopts the enablement of a freshly satisfied intent. Suspension survives.
    pub fn reset(&mut self, intent: CaptureIntent) {
        self.camera_wanted = intent.want_camera;
        self.microphone_wanted = intent.want_microphone;
    }

    // Sets the wanted bit for a kind, returning true if it was a change.
    pub fn set_wanted(&mut self, kind: MediaKind, value: bool) -> bool {
        let slot = match kind {
            MediaKind::Camera => &mut self.camera_wanted,
            MediaKind::Microphone => &mut self.microphone_wanted,
        };
        if *slot != value {
            *slot = value;
            true
        } else {
            false
        }
    }

    pub fn is_wanted(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Camera => self.camera_wanted,
            MediaKind::Microphone => self.microphone_wanted,
        }
    }

    /// Enablement a track of `kind` should have right now.
    pub fn effective(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Camera => self.camera_wanted && !self.video_suspended,
            MediaKind::Microphone => self.microphone_wanted,
        }
    }

    pub fn suspend_video(&mut self) -> bool {
        !std::mem::replace(&mut self.video_suspended, true)
    }

    pub fn resume_video(&mut self) -> bool {
        std::mem::replace(&mut self.video_suspended, false)
    }

    pub fn is_video_suspended(&self) -> bool {
        self.video_suspended
    }
}
