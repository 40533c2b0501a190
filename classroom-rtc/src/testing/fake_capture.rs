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
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use classroom_types::MediaKind;

use crate::errors::MediaError;
use crate::media_devices::{CaptureBackend, CaptureSource, TrackConstraints};

#[derive(Default)]
struct BackendState {
    open_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
    failures: HashMap<MediaKind, MediaError>,
    live: HashMap<MediaKind, usize>,
    max_live: HashMap<MediaKind, usize>,
    last_constraints: HashMap<MediaKind, TrackConstraints>,
    // Keyed by device id
    source_enabled: HashMap<String, bool>,
    latest_device: HashMap<MediaKind, String>,
    opened: usize,
}

/// A capture backend that never touches a device.
#[derive(Clone, Default)]
pub struct FakeCaptureBackend {
    state: Rc<RefCell<BackendState>>,
}

impl FakeCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the device layer was asked for a track.
    pub fn open_calls(&self) -> usize {
        self.state.borrow().open_calls
    }

    pub fn deny_permission(&self, kind: MediaKind) {
        self.state
            .borrow_mut()
            .failures
            .insert(kind, MediaError::permission_denied(kind, "NotAllowedError"));
    }

    pub fn make_unavailable(&self, kind: MediaKind) {
        self.state
            .borrow_mut()
            .failures
            .insert(kind, MediaError::device_unavailable(kind, "NotReadableError"));
    }

    pub fn restore(&self, kind: MediaKind) {
        self.state.borrow_mut().failures.remove(&kind);
    }

    /// Highest number of `open` calls that were pending at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.borrow().max_in_flight
    }

    /// Sources of `kind` opened and not yet stopped.
    pub fn live_count(&self, kind: MediaKind) -> usize {
        self.state.borrow().live.get(&kind).copied().unwrap_or(0)
    }

    /// Highest `live_count` ever observed for `kind`.
    pub fn max_live(&self, kind: MediaKind) -> usize {
        self.state.borrow().max_live.get(&kind).copied().unwrap_or(0)
    }

    /// Constraints last used to open or retune a source of `kind`.
    pub fn last_constraints(&self, kind: MediaKind) -> Option<TrackConstraints> {
        self.state.borrow().last_constraints.get(&kind).copied()
    }

    /// Whether the most recently opened source of `kind` is currently producing media.
    pub fn source_enabled(&self, kind: MediaKind) -> Option<bool> {
        let state = self.state.borrow();
        let device_id = state.latest_device.get(&kind)?;
        state.source_enabled.get(device_id).copied()
    }
}

#[async_trait(?Send)]
impl CaptureBackend for FakeCaptureBackend {
    async fn open(
        &self,
        constraints: &TrackConstraints,
    ) -> Result<Box<dyn CaptureSource>, MediaError> {
        {
            let mut state = self.state.borrow_mut();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        // Let concurrent callers interleave like a real permission prompt would
        tokio::task::yield_now().await;

        let kind = constraints.kind();
        let mut state = self.state.borrow_mut();
        state.in_flight -= 1;
        state.open_calls += 1;
        if let Some(error) = state.failures.get(&kind) {
            return Err(error.clone());
        }
        state.opened += 1;
        let device_id = format!("fake-{}-{}", kind, state.opened);
        let live = state.live.entry(kind).or_insert(0);
        *live += 1;
        let live = *live;
        let max = state.max_live.entry(kind).or_insert(0);
        *max = (*max).max(live);
        state.last_constraints.insert(kind, *constraints);
        state.source_enabled.insert(device_id.clone(), true);
        state.latest_device.insert(kind, device_id.clone());

        Ok(Box::new(FakeSource {
            kind,
            device_id,
            stopped: false,
            backend: self.state.clone(),
        }))
    }
}

struct FakeSource {
    kind: MediaKind,
    device_id: String,
    stopped: bool,
    backend: Rc<RefCell<BackendState>>,
}

impl CaptureSource for FakeSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn set_enabled(&mut self, enabled: bool) {
        if !self.stopped {
            self.backend
                .borrow_mut()
                .source_enabled
                .insert(self.device_id.clone(), enabled);
        }
    }

    fn apply_constraints(&mut self, constraints: &TrackConstraints) -> Result<(), MediaError> {
        if self.stopped {
            return Err(MediaError::device_unavailable(self.kind, "source stopped"));
        }
        self.backend
            .borrow_mut()
            .last_constraints
            .insert(self.kind, *constraints);
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut backend = self.backend.borrow_mut();
        if let Some(live) = backend.live.get_mut(&self.kind) {
            *live = live.saturating_sub(1);
        }
        backend.source_enabled.insert(self.device_id.clone(), false);
    }
}
