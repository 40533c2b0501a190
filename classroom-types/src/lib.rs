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

//! Types shared between the classroom media core and whatever carries its
//! signaling messages (websocket relay, HTTP long-poll, test harnesses).

pub mod callback;
pub mod media;
pub mod signaling;

pub use callback::Callback;
pub use media::{CaptureIntent, MediaKind, QualityTier};
pub use signaling::{IceCandidate, SdpType, SessionDescription, Signal, SignalKind, SignalingMessage};

/// Interprets an optional environment-style string as a boolean.
///
/// `"true"` and `"1"` (any case) are truthy, everything else is not.
pub fn truthy(s: Option<&str>) -> bool {
    if let Some(s) = s {
        ["true", "1"].contains(&s.to_lowercase().as_str())
    } else {
        false
    }
}
