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

use std::cell::RefCell;
use std::rc::Rc;

use classroom_types::{CaptureIntent, MediaKind, QualityTier};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use super::capture::{CaptureBackend, TrackConstraints};
use super::local_media::{LocalMediaHandle, LocalTrack};
use super::track_state::TrackState;
use crate::config::MediaProfiles;
use crate::errors::MediaError;
use crate::event_bus::EventBus;
use crate::events::SessionEvent;

#[derive(Default)]
struct ManagerState {
    handle: Option<LocalMediaHandle>,
    tracks: TrackState,
}

/// [HardwareResourceManager] owns the one local camera/microphone handle of the process.
///
/// Other components never reach the hardware directly; they go through
/// [`acquire`](Self::acquire), [`release`](Self::release) and the toggles, and
/// borrow the current tracks through [`local_tracks`](Self::local_tracks).
///
/// Acquisitions and releases are serialized: a second `acquire` waits until
/// the first one has settled, so the same device is never requested twice
/// concurrently.
///
/// Outcomes are also emitted to the event bus:
/// - `SessionEvent::LocalMediaAcquired` / `SessionEvent::LocalMediaReleased`
/// - `SessionEvent::HardwareError(error)` when acquisition fails
/// - `SessionEvent::VideoSuspended` / `SessionEvent::VideoResumed`
pub struct HardwareResourceManager {
    backend: Rc<dyn CaptureBackend>,
    profiles: MediaProfiles,
    events: EventBus,
    acquisition: Mutex<()>,
    state: RefCell<ManagerState>,
}

impl HardwareResourceManager {
    pub fn new(backend: Rc<dyn CaptureBackend>, profiles: MediaProfiles, events: EventBus) -> Self {
        Self {
            backend,
            profiles,
            events,
            acquisition: Mutex::new(()),
            state: RefCell::new(ManagerState::default()),
        }
    }

    /// Brings the hardware in line with `intent`.
    ///
    /// * An empty intent releases everything and returns `Ok(None)`.
    /// * An intent equal to the one already satisfied does not touch the device
    ///   layer (no permission prompt); the tracks are re-enabled according to the
    ///   intent and, if `resource_constrained` maps to another tier, retuned in place.
    /// * Any other intent installs a new handle. Live tracks of kinds the intent
    ///   still wants are carried over (retuned if the tier changed); the others are
    ///   stopped before the missing kinds are opened with the tier's constraints.
    ///
    /// On failure nothing is held afterwards, not even the previous handle, so a
    /// retry always starts from a clean slate.
    pub async fn acquire(
        &self,
        intent: CaptureIntent,
        resource_constrained: bool,
    ) -> Result<Option<LocalMediaHandle>, MediaError> {
        let _serial = self.acquisition.lock().await;
        let tier = QualityTier::from_constrained_flag(resource_constrained);

        if intent.is_empty() {
            self.release_locked();
            return Ok(None);
        }

        if let Some(handle) = self.satisfied_handle(intent) {
            debug!("intent {:?} already satisfied by {}", intent, handle.id());
            if handle.tier() != tier {
                info!("retuning local media {} from {} to {}", handle.id(), handle.tier(), tier);
                handle.retune(tier, |kind| TrackConstraints::for_kind(kind, tier, &self.profiles));
                self.events.emit(SessionEvent::QualityTierChanged(tier));
            }
            self.state.borrow_mut().tracks.reset(intent);
            self.apply_enablement(&handle);
            return Ok(Some(handle));
        }

        info!("acquiring local media for {:?} at {} tier", intent, tier);
        // A device is never open twice: tracks still wanted move to the new
        // handle, everything else is stopped before anything is opened
        let previous = self.state.borrow_mut().handle.take();
        let mut tracks: Vec<LocalTrack> = Vec::with_capacity(2);
        if let Some(previous) = &previous {
            tracks.extend(
                previous
                    .tracks()
                    .iter()
                    .filter(|t| t.is_live() && intent.wants(t.kind()))
                    .cloned(),
            );
            debug!(
                "replacing local media {}, carrying over {} tracks",
                previous.id(),
                tracks.len()
            );
            previous.retire(&tracks);
        }
        for track in &tracks {
            let constraints = TrackConstraints::for_kind(track.kind(), tier, &self.profiles);
            if constraints == track.constraints() {
                continue;
            }
            if let Err(e) = track.apply_constraints(constraints) {
                warn!("could not retune {} track {} to {}: {}", track.kind(), track.id(), tier, e);
            }
        }

        for kind in [MediaKind::Camera, MediaKind::Microphone] {
            if !intent.wants(kind) || tracks.iter().any(|t| t.kind() == kind) {
                continue;
            }
            let constraints = TrackConstraints::for_kind(kind, tier, &self.profiles);
            match self.backend.open(&constraints).await {
                Ok(source) => tracks.push(LocalTrack::new(constraints, source)),
                Err(e) => {
                    error!("failed to acquire {}: {}", kind, e);
                    for track in &tracks {
                        track.stop();
                    }
                    self.release_locked();
                    if previous.is_some() {
                        self.events.emit(SessionEvent::LocalMediaReleased);
                    }
                    self.events.emit(SessionEvent::HardwareError(e.clone()));
                    return Err(e);
                }
            }
        }
        tracks.sort_by_key(|t| t.kind());

        let handle = LocalMediaHandle::new(intent, tier, tracks);
        {
            let mut state = self.state.borrow_mut();
            state.tracks.reset(intent);
            state.handle = Some(handle.clone());
        }
        self.apply_enablement(&handle);
        self.events
            .emit(SessionEvent::LocalMediaAcquired { intent, tier });
        Ok(Some(handle))
    }

    /// Stops and discards all tracks. Safe to call when nothing is held.
    pub async fn release(&self) {
        let _serial = self.acquisition.lock().await;
        self.release_locked();
    }

    /// Flips a track's enabled flag without touching the device or any peer connection.
    ///
    /// No-op when nothing is held or the handle has no track of that kind.
    pub fn set_track_enabled(&self, kind: MediaKind, enabled: bool) {
        let handle = {
            let mut state = self.state.borrow_mut();
            let Some(handle) = state.handle.clone() else {
                debug!("set_track_enabled({}, {}) with no local media", kind, enabled);
                return;
            };
            if handle.track(kind).is_none() {
                debug!("set_track_enabled({}, {}) but no such track", kind, enabled);
                return;
            }
            state.tracks.set_wanted(kind, enabled);
            handle
        };
        self.apply_enablement(&handle);
    }

    /// Disables the video track while the page is hidden. Audio is untouched.
    pub fn suspend_video_for_background(&self) {
        let changed = self.state.borrow_mut().tracks.suspend_video();
        if !changed {
            return;
        }
        info!("suspending local video for background");
        if let Some(handle) = self.local_media() {
            self.apply_enablement(&handle);
        }
        self.events.emit(SessionEvent::VideoSuspended);
    }

    /// Restores the video track to the state it had before suspension.
    pub fn resume_video_for_foreground(&self) {
        let changed = self.state.borrow_mut().tracks.resume_video();
        if !changed {
            return;
        }
        info!("resuming local video for foreground");
        if let Some(handle) = self.local_media() {
            self.apply_enablement(&handle);
        }
        self.events.emit(SessionEvent::VideoResumed);
    }

    pub fn local_media(&self) -> Option<LocalMediaHandle> {
        self.state.borrow().handle.clone()
    }

    /// Tracks of the live handle, for attaching to a peer connection.
    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.state
            .borrow()
            .handle
            .as_ref()
            .map(|h| h.tracks().to_vec())
            .unwrap_or_default()
    }

    pub fn satisfied_intent(&self) -> Option<CaptureIntent> {
        self.state.borrow().handle.as_ref().map(|h| h.intent())
    }

    pub fn tier(&self) -> Option<QualityTier> {
        self.state.borrow().handle.as_ref().map(|h| h.tier())
    }

    pub fn is_video_suspended(&self) -> bool {
        self.state.borrow().tracks.is_video_suspended()
    }

    pub fn profiles(&self) -> &MediaProfiles {
        &self.profiles
    }

    fn satisfied_handle(&self, intent: CaptureIntent) -> Option<LocalMediaHandle> {
        self.state
            .borrow()
            .handle
            .as_ref()
            .filter(|h| h.intent() == intent)
            .cloned()
    }

    fn apply_enablement(&self, handle: &LocalMediaHandle) {
        let tracks = self.state.borrow().tracks;
        for track in handle.tracks() {
            track.set_enabled(tracks.effective(track.kind()));
        }
    }

    fn release_locked(&self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            state.tracks.reset(CaptureIntent::NONE);
            state.handle.take()
        };
        match previous {
            Some(handle) => {
                info!("releasing local media {}", handle.id());
                handle.stop_all();
                self.events.emit(SessionEvent::LocalMediaReleased);
            }
            None => debug!("release requested with no local media held"),
        }
    }
}
