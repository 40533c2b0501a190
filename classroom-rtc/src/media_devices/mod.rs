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

//! Local capture hardware: the device abstraction, the tracks it produces and
//! the [`HardwareResourceManager`] that owns the single live handle.

mod capture;
mod hardware_manager;
mod local_media;
#[cfg(feature = "devices")]
mod native_capture;
mod track_state;

pub use capture::{CaptureBackend, CaptureSource, TrackConstraints};
pub use hardware_manager::HardwareResourceManager;
pub use local_media::{LocalMediaHandle, LocalTrack};
#[cfg(feature = "devices")]
pub use native_capture::{CapturedFrame, NativeCaptureBackend};
