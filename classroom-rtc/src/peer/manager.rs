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

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;

use classroom_types::{
    Callback, IceCandidate, SessionDescription, Signal, SignalKind, SignalingMessage,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use super::connection::PeerConnection;
use super::negotiation::{DataChannelState, NegotiationRole, NegotiationState};
use super::parked::ParkedCandidates;
use super::transport::{
    PeerEvent, TransportConfig, TransportEvent, TransportEventSink, TransportFactory,
    TransportState,
};
use crate::config::ParticipantRole;
use crate::errors::PeerError;
use crate::event_bus::EventBus;
use crate::events::SessionEvent;
use crate::media_devices::HardwareResourceManager;
use crate::registry::RemoteStreamRegistry;

/// Options struct for constructing a [PeerConnectionManager]
#[derive(Clone, Debug)]
pub struct PeerConnectionManagerOptions {
    /// Our own peer id, used as `from` on every outbound message
    pub local_peer_id: String,

    /// Decides who backs off when both sides offer at once. The teacher keeps its offer.
    pub role: ParticipantRole,

    pub transport_config: TransportConfig,

    /// Callback for outbound signaling (offers, answers, trickled candidates)
    pub on_signal: Callback<SignalingMessage>,

    /// Callback for data channel payloads, with the sender's peer id
    pub on_data_received: Callback<(String, Vec<u8>)>,
}

/// [PeerConnectionManager] holds one [PeerConnection] per remote peer, keyed by peer id.
///
/// All per-peer work happens through `&mut self`, which serializes it. Transports report
/// back through a channel that is drained by [`process_transport_events`](Self::process_transport_events)
/// or awaited with [`next_transport_event`](Self::next_transport_event).
pub struct PeerConnectionManager {
    options: PeerConnectionManagerOptions,
    factory: Rc<dyn TransportFactory>,
    hardware: Rc<HardwareResourceManager>,
    registry: RemoteStreamRegistry,
    events: EventBus,
    peers: HashMap<String, PeerConnection>,
    // Candidates that arrived before any offer from that peer
    parked: ParkedCandidates,
    next_generation: u64,
    event_tx: mpsc::UnboundedSender<PeerEvent>,
    event_rx: mpsc::UnboundedReceiver<PeerEvent>,
}

impl PeerConnectionManager {
    pub fn new(
        options: PeerConnectionManagerOptions,
        factory: Rc<dyn TransportFactory>,
        hardware: Rc<HardwareResourceManager>,
        registry: RemoteStreamRegistry,
        events: EventBus,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            options,
            factory,
            hardware,
            registry,
            events,
            peers: HashMap::new(),
            parked: ParkedCandidates::new(),
            next_generation: 0,
            event_tx,
            event_rx,
        }
    }

    pub fn local_peer_id(&self) -> &str {
        &self.options.local_peer_id
    }

    /// Starts a fresh negotiation with `peer_id` as the offerer.
    ///
    /// Any existing connection to that peer is torn down first, so calling this twice leaves
    /// exactly one record. The tracks currently held by the hardware manager are attached and
    /// the application data channel is opened before the offer is created.
    pub async fn create_offer(&mut self, peer_id: &str) -> Result<(), PeerError> {
        if self.cleanup(peer_id) {
            debug!("replaced previous connection to {}", peer_id);
        }
        let connection = match self.open_connection(peer_id, NegotiationRole::Offerer).await {
            Ok(connection) => connection,
            Err(e) => {
                self.fail(peer_id, e.clone());
                return Err(e);
            }
        };

        let label = self.options.transport_config.data_channel_label.clone();
        let result = insert_connection(&mut self.peers, peer_id, connection)
            .start_offer(&label)
            .await;
        match result {
            Ok(offer) => {
                self.events
                    .emit(SessionEvent::PeerNegotiating(peer_id.to_string()));
                self.signal(peer_id, Signal::Offer(offer));
                Ok(())
            }
            Err(e) => {
                self.fail(peer_id, e.clone());
                Err(e)
            }
        }
    }

    /// Handles one inbound signaling message.
    ///
    /// `UnexpectedSignal` leaves the connection as it was. `NegotiationFailed` has already
    /// torn it down and been reported on the event bus by the time it is returned.
    pub async fn handle_signaling_message(
        &mut self,
        message: SignalingMessage,
    ) -> Result<(), PeerError> {
        if message.to != self.options.local_peer_id {
            return Err(PeerError::Misrouted {
                to: message.to,
                local: self.options.local_peer_id.clone(),
            });
        }
        debug!("received {} from {}", message.kind(), message.from);
        let peer_id = message.from;
        match message.signal {
            Signal::Offer(offer) => self.handle_offer(&peer_id, offer).await,
            Signal::Answer(answer) => self.handle_answer(&peer_id, answer).await,
            Signal::Candidate(candidate) => self.handle_candidate(&peer_id, candidate).await,
        }
    }

    async fn handle_offer(
        &mut self,
        peer_id: &str,
        offer: SessionDescription,
    ) -> Result<(), PeerError> {
        if let Some(existing) = self.peers.get(peer_id) {
            let glare = existing.role() == NegotiationRole::Offerer
                && existing.state() == NegotiationState::Negotiating;
            if glare && self.options.role == ParticipantRole::Teacher {
                info!("offer collision with {}, keeping our own offer", peer_id);
                return Ok(());
            }
            info!(
                "new offer from {} replaces {} connection",
                peer_id,
                existing.state()
            );
            self.cleanup(peer_id);
        }

        let mut connection = match self.open_connection(peer_id, NegotiationRole::Answerer).await {
            Ok(connection) => connection,
            Err(e) => {
                self.fail(peer_id, e.clone());
                return Err(e);
            }
        };
        let early = self.parked.take_for_offer(peer_id, &offer);
        if !early.is_empty() {
            debug!("moving {} parked candidates into {}", early.len(), peer_id);
            connection.adopt_early_candidates(early);
        }
        let result = insert_connection(&mut self.peers, peer_id, connection)
            .accept_offer(offer)
            .await;
        match result {
            Ok(answer) => {
                self.events
                    .emit(SessionEvent::PeerNegotiating(peer_id.to_string()));
                self.signal(peer_id, Signal::Answer(answer));
                Ok(())
            }
            Err(e) => {
                self.fail(peer_id, e.clone());
                Err(e)
            }
        }
    }

    async fn handle_answer(
        &mut self,
        peer_id: &str,
        answer: SessionDescription,
    ) -> Result<(), PeerError> {
        let Some(connection) = self.peers.get_mut(peer_id) else {
            return Err(PeerError::UnexpectedSignal {
                peer_id: peer_id.to_string(),
                kind: SignalKind::Answer,
                state: NegotiationState::Closed,
            });
        };
        let result = connection.accept_answer(answer).await;
        match result {
            Ok(()) => {
                if connection.try_complete() {
                    self.events
                        .emit(SessionEvent::PeerConnected(peer_id.to_string()));
                }
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                self.fail(peer_id, e.clone());
                Err(e)
            }
            Err(e) => {
                warn!("{}", e);
                Err(e)
            }
        }
    }

    async fn handle_candidate(
        &mut self,
        peer_id: &str,
        candidate: IceCandidate,
    ) -> Result<(), PeerError> {
        match self.peers.get_mut(peer_id) {
            Some(connection) => {
                let disposition = connection.add_remote_candidate(candidate).await?;
                debug!("candidate from {}: {:?}", peer_id, disposition);
            }
            None => {
                if self.parked.park(peer_id, candidate) {
                    debug!(
                        "parked candidate from {} until its offer arrives ({} parked)",
                        peer_id,
                        self.parked.len(peer_id)
                    );
                }
            }
        }
        Ok(())
    }

    /// Sends opaque bytes to `peer_id`. Returns false if there is no open data channel.
    pub async fn send_data(&mut self, peer_id: &str, payload: &[u8]) -> bool {
        let Some(connection) = self.peers.get_mut(peer_id) else {
            debug!("no connection to {}, dropping {} bytes", peer_id, payload.len());
            return false;
        };
        match connection.send_data(payload).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!("failed to send data to {}: {}", peer_id, e);
                false
            }
        }
    }

    pub async fn send_json<T: Serialize>(
        &mut self,
        peer_id: &str,
        value: &T,
    ) -> Result<bool, serde_json::Error> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.send_data(peer_id, &payload).await)
    }

    /// Sends `payload` to every peer with an open data channel and returns how many got it.
    pub async fn broadcast_data(&mut self, payload: &[u8]) -> usize {
        let mut delivered = 0;
        for (peer_id, connection) in self.peers.iter_mut() {
            match connection.send_data(payload).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!("failed to send data to {}: {}", peer_id, e),
            }
        }
        delivered
    }

    /// Tears down everything known about `peer_id`.
    ///
    /// Safe to call from any state and any number of times. Returns true if a connection
    /// was actually closed. Candidates from the closed session that arrive afterwards are
    /// not carried into the next one.
    pub fn cleanup(&mut self, peer_id: &str) -> bool {
        self.parked.retire(peer_id);
        if self.registry.remove(peer_id).is_some() {
            self.events
                .emit(SessionEvent::RemoteStreamRemoved(peer_id.to_string()));
        }
        match self.peers.remove(peer_id) {
            Some(mut connection) => {
                connection.close();
                info!("cleaned up connection to {}", peer_id);
                self.events
                    .emit(SessionEvent::PeerClosed(peer_id.to_string()));
                true
            }
            None => false,
        }
    }

    pub fn cleanup_all(&mut self) {
        for peer_id in self.peer_ids() {
            self.cleanup(&peer_id);
        }
        self.parked.clear();
    }

    /// Handles every transport event queued so far and returns how many there were.
    pub fn process_transport_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_peer_event(event);
            handled += 1;
        }
        handled
    }

    /// Waits for the next transport event and handles it.
    ///
    /// The manager keeps a sender of its own, so this only returns false if the channel
    /// has been torn down.
    pub async fn next_transport_event(&mut self) -> bool {
        match self.event_rx.recv().await {
            Some(event) => {
                self.handle_peer_event(event);
                true
            }
            None => false,
        }
    }

    fn handle_peer_event(&mut self, peer_event: PeerEvent) {
        let PeerEvent {
            peer_id,
            generation,
            event,
        } = peer_event;
        let Some(connection) = self.peers.get_mut(&peer_id) else {
            debug!("dropping {:?} for unknown peer {}", event, peer_id);
            return;
        };
        if connection.generation() != generation {
            debug!(
                "dropping {:?} from superseded transport {} of {} (current {})",
                event,
                generation,
                peer_id,
                connection.generation()
            );
            return;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.signal(&peer_id, Signal::Candidate(candidate));
            }
            TransportEvent::StateChanged(TransportState::Connecting) => {}
            TransportEvent::StateChanged(TransportState::Connected) => {
                connection.set_transport_connected(true);
                if connection.try_complete() {
                    self.events.emit(SessionEvent::PeerConnected(peer_id));
                }
            }
            TransportEvent::StateChanged(state) => {
                let reason = format!("transport {:?}", state).to_lowercase();
                let error = if connection.state() == NegotiationState::Connected {
                    PeerError::transport_disconnected(&peer_id, reason)
                } else {
                    PeerError::negotiation_failed(&peer_id, reason)
                };
                self.fail(&peer_id, error);
            }
            TransportEvent::RemoteTrack(stream) => {
                let stream_id = stream.stream_id.clone();
                if self.registry.insert(&peer_id, stream).is_some() {
                    debug!("remote stream of {} replaced by {}", peer_id, stream_id);
                }
                self.events
                    .emit(SessionEvent::RemoteStreamAdded { peer_id, stream_id });
            }
            TransportEvent::DataChannelOpen => {
                let label = &self.options.transport_config.data_channel_label;
                connection.set_data_channel_state(label, DataChannelState::Open);
                info!("data channel '{}' open with {}", label, peer_id);
                self.events.emit(SessionEvent::DataChannelOpen(peer_id));
            }
            TransportEvent::DataChannelClosed => {
                let label = &self.options.transport_config.data_channel_label;
                connection.set_data_channel_state(label, DataChannelState::Closed);
                debug!("data channel closed with {}", peer_id);
            }
            TransportEvent::DataReceived(payload) => {
                self.options.on_data_received.emit((peer_id, payload));
            }
        }
    }

    // Marks the connection failed, reports it, then discards it
    fn fail(&mut self, peer_id: &str, error: PeerError) {
        error!("{}", error);
        if let Some(connection) = self.peers.get_mut(peer_id) {
            connection.mark_failed();
        }
        self.events.emit(SessionEvent::PeerFailed {
            peer_id: peer_id.to_string(),
            error,
        });
        self.cleanup(peer_id);
    }

    async fn open_connection(
        &mut self,
        peer_id: &str,
        role: NegotiationRole,
    ) -> Result<PeerConnection, PeerError> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let sink = TransportEventSink::new(peer_id, generation, self.event_tx.clone());
        let transport = self
            .factory
            .create(peer_id, &self.options.transport_config, sink)
            .await
            .map_err(|e| PeerError::negotiation_failed(peer_id, format!("create transport: {e}")))?;

        let mut connection = PeerConnection::new(peer_id, role, generation, transport);
        if let Err(e) = connection.attach_tracks(&self.hardware.local_tracks()).await {
            connection.close();
            return Err(e);
        }
        Ok(connection)
    }

    fn signal(&self, peer_id: &str, signal: Signal) {
        debug!("sending {} to {}", signal.kind(), peer_id);
        self.options.on_signal.emit(SignalingMessage::new(
            self.options.local_peer_id.clone(),
            peer_id,
            signal,
        ));
    }

    pub fn state(&self, peer_id: &str) -> Option<NegotiationState> {
        self.peers.get(peer_id).map(|connection| connection.state())
    }

    pub fn peer(&self, peer_id: &str) -> Option<&PeerConnection> {
        self.peers.get(peer_id)
    }

    /// Peer ids with a live record, sorted.
    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn registry(&self) -> &RemoteStreamRegistry {
        &self.registry
    }

    pub fn hardware(&self) -> &Rc<HardwareResourceManager> {
        &self.hardware
    }
}

fn insert_connection<'a>(
    peers: &'a mut HashMap<String, PeerConnection>,
    peer_id: &str,
    connection: PeerConnection,
) -> &'a mut PeerConnection {
    match peers.entry(peer_id.to_string()) {
        Entry::Occupied(mut slot) => {
            slot.insert(connection);
            slot.into_mut()
        }
        Entry::Vacant(slot) => slot.insert(connection),
    }
}
