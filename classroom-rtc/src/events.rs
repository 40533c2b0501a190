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

//! Events emitted by the media core.
//!
//! These are delivered via the session's [`EventBus`](crate::EventBus) so any
//! UI layer can react to hardware problems, peer state and remote streams.

use classroom_types::{CaptureIntent, QualityTier};

use crate::errors::{MediaError, PeerError};

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    // === Local media ===
    /// A new local handle was installed.
    LocalMediaAcquired {
        intent: CaptureIntent,
        tier: QualityTier,
    },

    /// The local handle was stopped and discarded.
    LocalMediaReleased,

    /// The live handle was retuned to another tier without reacquiring.
    QualityTierChanged(QualityTier),

    /// Hardware acquisition failed. The manager holds no handle afterwards.
    HardwareError(MediaError),

    /// Video track disabled because the page went to the background.
    VideoSuspended,

    /// Video track restored after returning to the foreground.
    VideoResumed,

    // === Peers ===
    /// A local offer or answer went out for this peer.
    PeerNegotiating(String),

    PeerConnected(String),

    /// The connection failed and has already been cleaned up.
    PeerFailed { peer_id: String, error: PeerError },

    /// The record for this peer was discarded.
    PeerClosed(String),

    DataChannelOpen(String),

    // === Remote media ===
    RemoteStreamAdded { peer_id: String, stream_id: String },

    RemoteStreamRemoved(String),
}
