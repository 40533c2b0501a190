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

//! Peer connection engine: one [`PeerConnection`] per remote participant,
//! owned and driven by the [`PeerConnectionManager`].

mod connection;
mod manager;
mod negotiation;
mod parked;
mod transport;
#[cfg(feature = "native")]
mod webrtc_transport;

pub use connection::PeerConnection;
pub use manager::{PeerConnectionManager, PeerConnectionManagerOptions};
pub use negotiation::{
    CandidateDisposition, DataChannel, DataChannelState, NegotiationRole, NegotiationState,
    PeerConnectionRecord,
};
pub use transport::{
    PeerEvent, PeerTransport, TransportConfig, TransportError, TransportEvent,
    TransportEventSink, TransportFactory, TransportState,
};
#[cfg(feature = "native")]
pub use webrtc_transport::{LocalSampleTrack, WebRtcTransportFactory};
