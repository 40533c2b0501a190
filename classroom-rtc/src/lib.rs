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

//! This crate is the real-time media core of a live virtual classroom (one teacher, several
//! students). It owns the local camera and microphone, negotiates one pairwise peer
//! connection per remote participant, and multiplexes opaque application payloads (whiteboard
//! strokes, chat) over a data channel on each of those connections.
//!
//! The crate makes no assumptions about the UI, the signaling relay, or the media engine. The
//! device layer is reached through [`CaptureBackend`] and the network layer through
//! [`TransportFactory`]/[`PeerTransport`], so the same core drives a browser build, a native
//! build, or the in-memory fakes in [`testing`] (feature `testing`). The native transport is
//! `WebRtcTransportFactory` on top of the `webrtc` crate (feature `native`, on by default).
//! Real cameras and microphones are opened by `NativeCaptureBackend` (feature `devices`).
//!
//! Everything runs on one event-loop thread. Handles are `Rc` based and async traits are
//! declared `?Send`.
//!
//! # Outline of usage
//!
//! ## Session creation:
//! ```ignore
//! let session = ClassroomSession::new(ClassroomSessionOptions {
//!     config: SessionConfig::from_env_or_default()?,
//!     capture_backend,                     // Rc<dyn CaptureBackend>
//!     transport_factory,                   // Rc<dyn TransportFactory>
//!     on_signal: Callback::from(move |msg| relay.send(msg)),
//!     on_data_received: Callback::from(|(peer_id, bytes)| whiteboard.apply(peer_id, bytes)),
//! })?;
//! let mut events = session.subscribe();
//! ```
//!
//! ## Local media:
//! ```ignore
//! session.request_capture(CaptureIntent::new(true, true), resource_constrained).await?;
//! session.set_track_enabled(MediaKind::Microphone, false);
//! ```
//!
//! ## Peers:
//! ```ignore
//! session.connect_to("student-7").await?;          // outbound offer
//! session.handle_signaling(inbound_message).await?; // offer / answer / candidate
//! session.process_transport_events();               // ICE, tracks, data
//! session.send_data("student-7", &payload).await;
//! session.disconnect("student-7");
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod event_bus;
pub mod events;
pub mod lifecycle;
pub mod media_devices;
pub mod peer;
pub mod registry;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use classroom_types::{
    Callback, CaptureIntent, IceCandidate, MediaKind, QualityTier, SdpType, SessionDescription,
    Signal, SignalKind, SignalingMessage,
};
pub use config::{AudioProfile, MediaProfiles, ParticipantRole, SessionConfig, VideoProfile};
pub use errors::{MediaError, PeerError};
pub use event_bus::EventBus;
pub use events::SessionEvent;
pub use lifecycle::{LifecycleMonitor, Visibility};
pub use media_devices::{
    CaptureBackend, CaptureSource, HardwareResourceManager, LocalMediaHandle, LocalTrack,
    TrackConstraints,
};
pub use peer::{
    CandidateDisposition, DataChannelState, NegotiationRole, NegotiationState, PeerConnection,
    PeerConnectionManager, PeerConnectionManagerOptions, PeerEvent, PeerTransport,
    TransportConfig, TransportError, TransportEvent, TransportEventSink, TransportFactory,
    TransportState,
};
#[cfg(feature = "devices")]
pub use media_devices::{CapturedFrame, NativeCaptureBackend};
#[cfg(feature = "native")]
pub use peer::{LocalSampleTrack, WebRtcTransportFactory};
pub use registry::{RemoteStream, RemoteStreamEntry, RemoteStreamRegistry};
pub use session::{ClassroomSession, ClassroomSessionOptions};
