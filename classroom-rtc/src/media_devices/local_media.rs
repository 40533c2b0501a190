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

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use classroom_types::{CaptureIntent, MediaKind, QualityTier};
use log::{debug, warn};
use web_time::Instant;

use super::capture::{CaptureSource, TrackConstraints};

struct TrackInner {
    id: String,
    kind: MediaKind,
    device_id: String,
    enabled: Cell<bool>,
    stopped: Cell<bool>,
    constraints: Cell<TrackConstraints>,
    source: RefCell<Box<dyn CaptureSource>>,
}

/// [LocalTrack] is a shared reference to one live capture track.
///
/// Peer connections clone it to attach the track to their transport. Only the
/// [`HardwareResourceManager`](super::HardwareResourceManager) can enable,
/// retune or stop it.
#[derive(Clone)]
pub struct LocalTrack {
    inner: Rc<TrackInner>,
}

impl LocalTrack {
    pub(crate) fn new(constraints: TrackConstraints, source: Box<dyn CaptureSource>) -> Self {
        let device_id = source.device_id().to_string();
        Self {
            inner: Rc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind: constraints.kind(),
                device_id,
                enabled: Cell::new(true),
                stopped: Cell::new(false),
                constraints: Cell::new(constraints),
                source: RefCell::new(source),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// False once the device has been released.
    pub fn is_live(&self) -> bool {
        !self.inner.stopped.get()
    }

    pub fn constraints(&self) -> TrackConstraints {
        self.inner.constraints.get()
    }

    // Sets the enabled bit, returning true if it was a change.
    pub(crate) fn set_enabled(&self, value: bool) -> bool {
        if !self.is_live() || value == self.inner.enabled.get() {
            return false;
        }
        self.inner.source.borrow_mut().set_enabled(value);
        self.inner.enabled.set(value);
        debug!("{} track {} enabled={}", self.kind(), self.id(), value);
        true
    }

    pub(crate) fn apply_constraints(
        &self,
        constraints: TrackConstraints,
    ) -> Result<(), crate::errors::MediaError> {
        self.inner
            .source
            .borrow_mut()
            .apply_constraints(&constraints)?;
        self.inner.constraints.set(constraints);
        Ok(())
    }

    pub(crate) fn stop(&self) {
        if self.inner.stopped.replace(true) {
            return;
        }
        self.inner.enabled.set(false);
        self.inner.source.borrow_mut().stop();
        debug!("stopped {} track {}", self.kind(), self.id());
    }

    pub fn ptr_eq(&self, other: &LocalTrack) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("device_id", &self.inner.device_id)
            .field("enabled", &self.inner.enabled.get())
            .field("live", &self.is_live())
            .finish()
    }
}

struct HandleInner {
    id: String,
    intent: CaptureIntent,
    tier: Cell<QualityTier>,
    tracks: Vec<LocalTrack>,
    acquired_at: Instant,
    live: Cell<bool>,
}

/// [LocalMediaHandle] is the local media stream: at most one video and one audio track.
///
/// Cloning the handle clones the reference, not the hardware. Once released by
/// the manager every clone reports [`is_live`](Self::is_live) `false`.
#[derive(Clone)]
pub struct LocalMediaHandle {
    inner: Rc<HandleInner>,
}

impl LocalMediaHandle {
    pub(crate) fn new(intent: CaptureIntent, tier: QualityTier, tracks: Vec<LocalTrack>) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                id: uuid::Uuid::new_v4().to_string(),
                intent,
                tier: Cell::new(tier),
                tracks,
                acquired_at: Instant::now(),
                live: Cell::new(true),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The intent this handle satisfies.
    pub fn intent(&self) -> CaptureIntent {
        self.inner.intent
    }

    pub fn tier(&self) -> QualityTier {
        self.inner.tier.get()
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.inner.tracks
    }

    pub fn track(&self, kind: MediaKind) -> Option<&LocalTrack> {
        self.inner.tracks.iter().find(|t| t.kind() == kind)
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.get()
    }

    pub fn ptr_eq(&self, other: &LocalMediaHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // Retunes every track, keeping the old constraints on the tracks that refuse.
    pub(crate) fn retune(&self, tier: QualityTier, constraints_for: impl Fn(MediaKind) -> TrackConstraints) {
        for track in self.tracks() {
            let next = constraints_for(track.kind());
            if next == track.constraints() {
                continue;
            }
            if let Err(e) = track.apply_constraints(next) {
                warn!("could not retune {} track {} to {}: {}", track.kind(), track.id(), tier, e);
            }
        }
        self.inner.tier.set(tier);
    }

    // Hands `keep` over to a successor handle and stops every other track.
    pub(crate) fn retire(&self, keep: &[LocalTrack]) {
        if !self.inner.live.replace(false) {
            return;
        }
        for track in self.tracks() {
            if !keep.iter().any(|k| k.ptr_eq(track)) {
                track.stop();
            }
        }
        debug!("retired local media {}", self.id());
    }

    pub(crate) fn stop_all(&self) {
        if !self.inner.live.replace(false) {
            return;
        }
        for track in self.tracks() {
            track.stop();
        }
        debug!(
            "released local media {} after {:?}",
            self.id(),
            self.inner.acquired_at.elapsed()
        );
    }
}

impl fmt::Debug for LocalMediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMediaHandle")
            .field("id", &self.inner.id)
            .field("intent", &self.inner.intent)
            .field("tier", &self.inner.tier.get())
            .field("tracks", &self.inner.tracks)
            .field("live", &self.is_live())
            .finish()
    }
}
