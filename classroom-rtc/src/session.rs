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

use std::rc::Rc;

use anyhow::Context;
use async_broadcast::Receiver;
use classroom_types::{Callback, CaptureIntent, MediaKind, SignalingMessage};
use log::info;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::errors::{MediaError, PeerError};
use crate::event_bus::EventBus;
use crate::events::SessionEvent;
use crate::lifecycle::{LifecycleMonitor, Visibility};
use crate::media_devices::{CaptureBackend, HardwareResourceManager, LocalMediaHandle};
use crate::peer::{
    PeerConnectionManager, PeerConnectionManagerOptions, TransportConfig, TransportFactory,
};
use crate::registry::RemoteStreamRegistry;

/// Options struct for constructing a [ClassroomSession]
pub struct ClassroomSessionOptions {
    pub config: SessionConfig,

    /// Device layer used for camera and microphone
    pub capture_backend: Rc<dyn CaptureBackend>,

    /// Network layer used for each peer connection
    pub transport_factory: Rc<dyn TransportFactory>,

    /// Callback for outbound signaling, to be relayed to `message.to`
    pub on_signal: Callback<SignalingMessage>,

    /// Callback for inbound data channel payloads
    pub on_data_received: Callback<(String, Vec<u8>)>,
}

/// The media core of one participant: hardware, peers, remote streams and lifecycle, sharing one
/// event bus.
pub struct ClassroomSession {
    config: SessionConfig,
    events: EventBus,
    hardware: Rc<HardwareResourceManager>,
    peers: PeerConnectionManager,
    lifecycle: LifecycleMonitor,
}

impl ClassroomSession {
    pub fn new(options: ClassroomSessionOptions) -> anyhow::Result<Self> {
        let ClassroomSessionOptions {
            config,
            capture_backend,
            transport_factory,
            on_signal,
            on_data_received,
        } = options;
        config.validate().context("invalid session config")?;

        let events = EventBus::new(config.event_bus_capacity);
        let hardware = Rc::new(HardwareResourceManager::new(
            capture_backend,
            config.media.clone(),
            events.clone(),
        ));
        let peers = PeerConnectionManager::new(
            PeerConnectionManagerOptions {
                local_peer_id: config.local_peer_id.clone(),
                role: config.role,
                transport_config: TransportConfig {
                    ice_servers: config.ice_servers.clone(),
                    data_channel_label: config.data_channel_label.clone(),
                },
                on_signal,
                on_data_received,
            },
            transport_factory,
            hardware.clone(),
            RemoteStreamRegistry::new(),
            events.clone(),
        );
        let lifecycle = LifecycleMonitor::new(hardware.clone());
        info!(
            "classroom session ready for {} as {:?}",
            config.local_peer_id, config.role
        );

        Ok(Self {
            config,
            events,
            hardware,
            peers,
            lifecycle,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// See [`HardwareResourceManager::acquire`]. Peers that are already connected keep the
    /// tracks they were negotiated with until [`connect_to`](Self::connect_to) is called again.
    pub async fn request_capture(
        &self,
        intent: CaptureIntent,
        resource_constrained: bool,
    ) -> Result<Option<LocalMediaHandle>, MediaError> {
        self.hardware.acquire(intent, resource_constrained).await
    }

    pub fn set_track_enabled(&self, kind: MediaKind, enabled: bool) {
        self.hardware.set_track_enabled(kind, enabled);
    }

    pub fn local_media(&self) -> Option<LocalMediaHandle> {
        self.hardware.local_media()
    }

    pub fn remote_streams(&self) -> &RemoteStreamRegistry {
        self.peers.registry()
    }

    pub async fn connect_to(&mut self, peer_id: &str) -> Result<(), PeerError> {
        self.peers.create_offer(peer_id).await
    }

    pub async fn handle_signaling(&mut self, message: SignalingMessage) -> Result<(), PeerError> {
        self.peers.handle_signaling_message(message).await
    }

    /// Parses a JSON signaling message from the relay and handles it.
    pub async fn handle_signaling_json(&mut self, text: &str) -> anyhow::Result<()> {
        let message = SignalingMessage::from_json(text).context("malformed signaling message")?;
        self.peers.handle_signaling_message(message).await?;
        Ok(())
    }

    pub async fn send_data(&mut self, peer_id: &str, payload: &[u8]) -> bool {
        self.peers.send_data(peer_id, payload).await
    }

    pub async fn send_json<T: Serialize>(
        &mut self,
        peer_id: &str,
        value: &T,
    ) -> Result<bool, serde_json::Error> {
        self.peers.send_json(peer_id, value).await
    }

    pub async fn broadcast_data(&mut self, payload: &[u8]) -> usize {
        self.peers.broadcast_data(payload).await
    }

    pub fn process_transport_events(&mut self) -> usize {
        self.peers.process_transport_events()
    }

    pub async fn next_transport_event(&mut self) -> bool {
        self.peers.next_transport_event().await
    }

    pub fn visibility_changed(&self, visibility: Visibility) -> bool {
        self.lifecycle.on_visibility_change(visibility)
    }

    pub fn disconnect(&mut self, peer_id: &str) -> bool {
        self.peers.cleanup(peer_id)
    }

    /// Leaves the session: every peer is closed and the hardware released.
    pub async fn end(&mut self) {
        self.lifecycle.teardown(&mut self.peers).await;
    }

    pub fn hardware(&self) -> &Rc<HardwareResourceManager> {
        &self.hardware
    }

    pub fn lifecycle(&self) -> &LifecycleMonitor {
        &self.lifecycle
    }

    pub fn peers(&self) -> &PeerConnectionManager {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut PeerConnectionManager {
        &mut self.peers
    }
}
