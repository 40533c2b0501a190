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

use classroom_types::{IceCandidate, SessionDescription, SignalKind};
use log::{debug, info, warn};
use web_time::Instant;

use super::negotiation::{
    CandidateDisposition, DataChannelState, NegotiationRole, NegotiationState,
    PeerConnectionRecord,
};
use super::transport::{PeerTransport, TransportError};
use crate::errors::PeerError;
use crate::media_devices::LocalTrack;

/// [PeerConnection] is the engine instance for a single remote peer.
///
/// It owns the [`PeerConnectionRecord`] and the transport, and performs each
/// step of the offer/answer exchange against them. It does not emit events or
/// signaling itself; the [`PeerConnectionManager`](super::PeerConnectionManager)
/// does that from the results.
pub struct PeerConnection {
    record: PeerConnectionRecord,
    transport: Box<dyn PeerTransport>,
    generation: u64,
    created_at: Instant,
    // ICE username fragments of the remote description, once set
    remote_ufrags: Vec<String>,
}

impl PeerConnection {
    pub(crate) fn new(
        peer_id: &str,
        role: NegotiationRole,
        generation: u64,
        transport: Box<dyn PeerTransport>,
    ) -> Self {
        Self {
            record: PeerConnectionRecord::new(peer_id, role),
            transport,
            generation,
            created_at: Instant::now(),
            remote_ufrags: Vec::new(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.record.peer_id
    }

    pub fn state(&self) -> NegotiationState {
        self.record.state
    }

    pub fn role(&self) -> NegotiationRole {
        self.record.role
    }

    pub fn record(&self) -> &PeerConnectionRecord {
        &self.record
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_data_channel_open(&self) -> bool {
        self.record.is_data_channel_open()
    }

    /// Attaches whatever the hardware manager holds right now.
    pub(crate) async fn attach_tracks(&mut self, tracks: &[LocalTrack]) -> Result<(), PeerError> {
        for track in tracks {
            self.transport
                .add_track(track)
                .await
                .map_err(|e| self.negotiation_failed("add_track", e))?;
            debug!("attached {} track {} to {}", track.kind(), track.id(), self.peer_id());
        }
        Ok(())
    }

    /// Seeds the queue with candidates that arrived before the record existed.
    pub(crate) fn adopt_early_candidates(&mut self, candidates: impl IntoIterator<Item = IceCandidate>) {
        self.record.pending_ice_candidates.extend(candidates);
    }

    /// Offerer side: data channel, local offer, Idle -> Negotiating.
    pub(crate) async fn start_offer(
        &mut self,
        data_channel_label: &str,
    ) -> Result<SessionDescription, PeerError> {
        self.record.advance(NegotiationState::Negotiating)?;
        self.transport
            .create_data_channel(data_channel_label)
            .await
            .map_err(|e| self.negotiation_failed("create_data_channel", e))?;
        self.record
            .set_data_channel_state(data_channel_label, DataChannelState::Connecting);

        let offer = self
            .transport
            .create_offer()
            .await
            .map_err(|e| self.negotiation_failed("create_offer", e))?;
        self.transport
            .set_local_description(offer.clone())
            .await
            .map_err(|e| self.negotiation_failed("set_local_description", e))?;
        self.record.local_description_set = true;
        info!("offer ready for {}", self.peer_id());
        Ok(offer)
    }

    /// Answerer side: remote offer, queued candidates, local answer.
    pub(crate) async fn accept_offer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, PeerError> {
        if self.record.state != NegotiationState::Idle || self.record.role != NegotiationRole::Answerer {
            return Err(self.unexpected(SignalKind::Offer));
        }
        self.record.advance(NegotiationState::Negotiating)?;
        self.set_remote_description(offer).await?;

        let answer = self
            .transport
            .create_answer()
            .await
            .map_err(|e| self.negotiation_failed("create_answer", e))?;
        self.transport
            .set_local_description(answer.clone())
            .await
            .map_err(|e| self.negotiation_failed("set_local_description", e))?;
        self.record.local_description_set = true;
        info!("answer ready for {}", self.peer_id());
        Ok(answer)
    }

    /// Offerer side: the remote answer completes the description exchange.
    pub(crate) async fn accept_answer(&mut self, answer: SessionDescription) -> Result<(), PeerError> {
        if self.record.role != NegotiationRole::Offerer
            || self.record.state != NegotiationState::Negotiating
            || self.record.remote_description_set
        {
            return Err(self.unexpected(SignalKind::Answer));
        }
        self.set_remote_description(answer).await
    }

    /// Applies a remote candidate now, or queues it until the remote description is set.
    pub(crate) async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, PeerError> {
        if self.record.state.is_terminal() {
            return Err(self.unexpected(SignalKind::Candidate));
        }
        if !self.record.remote_description_set {
            self.record.pending_ice_candidates.push_back(candidate);
            debug!(
                "queued candidate for {} ({} pending)",
                self.peer_id(),
                self.record.pending_ice_candidates.len()
            );
            return Ok(CandidateDisposition::Queued);
        }
        self.apply_candidate(candidate).await;
        Ok(CandidateDisposition::Applied)
    }

    async fn set_remote_description(&mut self, description: SessionDescription) -> Result<(), PeerError> {
        let ufrags: Vec<String> = description
            .ice_ufrags()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.transport
            .set_remote_description(description)
            .await
            .map_err(|e| self.negotiation_failed("set_remote_description", e))?;
        self.record.remote_description_set = true;
        self.remote_ufrags = ufrags;

        // Queued candidates go in before any live one can
        let pending = std::mem::take(&mut self.record.pending_ice_candidates);
        if !pending.is_empty() {
            debug!("applying {} queued candidates for {}", pending.len(), self.peer_id());
        }
        for candidate in pending {
            self.apply_candidate(candidate).await;
        }
        Ok(())
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        if let Some(ufrag) = candidate.ufrag() {
            if !self.remote_ufrags.is_empty() && !self.remote_ufrags.iter().any(|u| u == ufrag) {
                debug!(
                    "ignoring candidate for ICE session {} of {}, not the current one",
                    ufrag,
                    self.peer_id()
                );
                return;
            }
        }
        match self.transport.add_ice_candidate(candidate).await {
            Ok(()) => self.record.applied_candidates += 1,
            // A bad candidate only removes one path; ICE failure is reported by the transport
            Err(e) => warn!("candidate rejected for {}: {}", self.peer_id(), e),
        }
    }

    pub(crate) fn set_transport_connected(&mut self, connected: bool) {
        self.record.transport_connected = connected;
    }

    /// Moves to Connected if everything is in place. Returns true on the transition.
    pub(crate) fn try_complete(&mut self) -> bool {
        if !self.record.ready_to_connect() {
            return false;
        }
        if self.record.advance(NegotiationState::Connected).is_err() {
            return false;
        }
        info!(
            "connected to {} after {:?}",
            self.peer_id(),
            self.created_at.elapsed()
        );
        true
    }

    pub(crate) fn set_data_channel_state(&mut self, label: &str, state: DataChannelState) {
        self.record.set_data_channel_state(label, state);
    }

    pub(crate) fn mark_failed(&mut self) {
        if let Err(e) = self.record.advance(NegotiationState::Failed) {
            debug!("{}: {}", self.peer_id(), e);
        }
    }

    /// Writes on the data channel. Returns false, without error, if it is not open yet.
    pub(crate) async fn send_data(&mut self, payload: &[u8]) -> Result<bool, TransportError> {
        if !self.record.is_data_channel_open() {
            debug!(
                "data channel to {} not open, dropping {} bytes",
                self.peer_id(),
                payload.len()
            );
            return Ok(false);
        }
        self.transport.send_data(payload).await?;
        Ok(true)
    }

    /// Closes the data channel and the transport. Idempotent.
    pub(crate) fn close(&mut self) {
        if self.record.state.is_terminal() {
            return;
        }
        if let Some(channel) = self.record.data_channel.as_mut() {
            channel.state = DataChannelState::Closed;
        }
        self.transport.close();
        self.record.pending_ice_candidates.clear();
        let _ = self.record.advance(NegotiationState::Closed);
        debug!("closed connection to {}", self.peer_id());
    }

    fn negotiation_failed(&self, step: &str, e: TransportError) -> PeerError {
        PeerError::negotiation_failed(self.peer_id(), format!("{step}: {e}"))
    }

    fn unexpected(&self, kind: SignalKind) -> PeerError {
        PeerError::UnexpectedSignal {
            peer_id: self.peer_id().to_string(),
            kind,
            state: self.record.state,
        }
    }
}
