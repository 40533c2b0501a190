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

//! The seam between the engine and a concrete WebRTC stack.
//!
//! Transports never call back into the engine. Everything they observe
//! (trickled local candidates, ICE state, inbound tracks, data) is pushed as a
//! [`TransportEvent`] through their [`TransportEventSink`], and the engine
//! consumes those events one at a time, so per-peer handling is strictly
//! serialized.

use async_trait::async_trait;
use classroom_types::{IceCandidate, SessionDescription};
use log::debug;
use tokio::sync::mpsc;

use crate::media_devices::LocalTrack;
use crate::registry::RemoteStream;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Connection state as reported by the ICE/DTLS layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// A local ICE candidate to trickle to the remote peer.
    LocalCandidate(IceCandidate),
    StateChanged(TransportState),
    /// Inbound media from the remote peer.
    RemoteTrack(RemoteStream),
    DataChannelOpen,
    DataChannelClosed,
    DataReceived(Vec<u8>),
}

/// A transport event tagged with the connection that produced it.
#[derive(Clone, Debug)]
pub struct PeerEvent {
    pub peer_id: String,
    /// Distinguishes a superseded transport from its replacement for the same peer.
    pub generation: u64,
    pub event: TransportEvent,
}

#[derive(Clone, Debug)]
pub struct TransportEventSink {
    peer_id: String,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl TransportEventSink {
    pub(crate) fn new(
        peer_id: &str,
        generation: u64,
        tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            generation,
            tx,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queues an event for the engine. Returns false if the engine is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        let sent = self
            .tx
            .send(PeerEvent {
                peer_id: self.peer_id.clone(),
                generation: self.generation,
                event,
            })
            .is_ok();
        if !sent {
            debug!("engine gone, dropping transport event for {}", self.peer_id);
        }
        sent
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub ice_servers: Vec<String>,
    pub data_channel_label: String,
}

/// One pairwise connection as implemented by the underlying WebRTC stack.
#[async_trait(?Send)]
pub trait PeerTransport {
    async fn add_track(&mut self, track: &LocalTrack) -> Result<(), TransportError>;

    async fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError>;

    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Writes one message on the data channel.
    async fn send_data(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Closes the data channel and the connection. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Creates a fresh transport for a peer.
#[async_trait(?Send)]
pub trait TransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        config: &TransportConfig,
        events: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError>;
}
