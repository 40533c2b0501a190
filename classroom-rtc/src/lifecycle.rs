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

//! Page visibility and session end.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use log::{debug, info};

use crate::media_devices::HardwareResourceManager;
use crate::peer::PeerConnectionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Foreground,
    Background,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Visibility::Foreground => write!(f, "foreground"),
            Visibility::Background => write!(f, "background"),
        }
    }
}

/// Translates visibility changes into video suspension and session end into teardown.
pub struct LifecycleMonitor {
    hardware: Rc<HardwareResourceManager>,
    visibility: Cell<Visibility>,
}

impl LifecycleMonitor {
    pub fn new(hardware: Rc<HardwareResourceManager>) -> Self {
        Self {
            hardware,
            visibility: Cell::new(Visibility::Foreground),
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility.get()
    }

    /// Returns false when `visibility` is what we already had.
    pub fn on_visibility_change(&self, visibility: Visibility) -> bool {
        if self.visibility.replace(visibility) == visibility {
            debug!("already in {}", visibility);
            return false;
        }
        info!("page moved to {}", visibility);
        match visibility {
            Visibility::Background => self.hardware.suspend_video_for_background(),
            Visibility::Foreground => self.hardware.resume_video_for_foreground(),
        }
        true
    }

    /// Closes every peer connection, then releases the hardware.
    pub async fn teardown(&self, peers: &mut PeerConnectionManager) {
        info!("tearing down {} peer connections", peers.len());
        peers.cleanup_all();
        self.hardware.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaProfiles;
    use crate::event_bus::EventBus;
    use crate::events::SessionEvent;
    use crate::testing::FakeCaptureBackend;
    use classroom_types::{CaptureIntent, MediaKind};

    fn monitor() -> (LifecycleMonitor, Rc<HardwareResourceManager>, EventBus) {
        let events = EventBus::default();
        let hardware = Rc::new(HardwareResourceManager::new(
            Rc::new(FakeCaptureBackend::new()),
            MediaProfiles::default(),
            events.clone(),
        ));
        (LifecycleMonitor::new(hardware.clone()), hardware, events)
    }

    #[tokio::test]
    async fn test_background_round_trip_restores_video() {
        let (monitor, hardware, _events) = monitor();
        let handle = hardware
            .acquire(CaptureIntent::new(true, true), false)
            .await
            .unwrap()
            .unwrap();

        assert!(monitor.on_visibility_change(Visibility::Background));
        assert!(!handle.track(MediaKind::Camera).unwrap().is_enabled());
        assert!(handle.track(MediaKind::Microphone).unwrap().is_enabled());

        assert!(monitor.on_visibility_change(Visibility::Foreground));
        assert!(handle.track(MediaKind::Camera).unwrap().is_enabled());
        assert!(handle.track(MediaKind::Microphone).unwrap().is_enabled());
    }

    #[test]
    fn test_repeated_visibility_is_ignored() {
        let (monitor, hardware, events) = monitor();
        let mut rx = events.subscribe();
        assert!(!monitor.on_visibility_change(Visibility::Foreground));
        assert!(monitor.on_visibility_change(Visibility::Background));
        assert!(!monitor.on_visibility_change(Visibility::Background));
        assert!(hardware.is_video_suspended());
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::VideoSuspended);
        assert!(rx.try_recv().is_err());
    }
}
