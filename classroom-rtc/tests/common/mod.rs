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

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use async_broadcast::Receiver;
use classroom_rtc::testing::{FakeCaptureBackend, LoopbackTransportFactory};
use classroom_rtc::{
    Callback, EventBus, HardwareResourceManager, IceCandidate, MediaProfiles, ParticipantRole,
    PeerConnectionManager, PeerConnectionManagerOptions, RemoteStreamRegistry, SessionEvent,
    SignalingMessage, TransportConfig,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn hardware() -> (Rc<HardwareResourceManager>, FakeCaptureBackend, EventBus) {
    let events = EventBus::default();
    let backend = FakeCaptureBackend::new();
    let hardware = Rc::new(HardwareResourceManager::new(
        Rc::new(backend.clone()),
        MediaProfiles::default(),
        events.clone(),
    ));
    (hardware, backend, events)
}

/// One participant: a manager wired to fakes, with its outbound traffic recorded.
pub struct Harness {
    pub manager: PeerConnectionManager,
    pub hardware: Rc<HardwareResourceManager>,
    pub backend: FakeCaptureBackend,
    pub factory: LoopbackTransportFactory,
    pub registry: RemoteStreamRegistry,
    pub events: EventBus,
    pub outbox: Rc<RefCell<Vec<SignalingMessage>>>,
    pub received: Rc<RefCell<Vec<(String, Vec<u8>)>>>,
}

impl Harness {
    pub fn new(local_peer_id: &str, role: ParticipantRole) -> Self {
        init_logger();
        let (hardware, backend, events) = hardware();
        let factory = LoopbackTransportFactory::new();
        let registry = RemoteStreamRegistry::new();
        let outbox = Rc::new(RefCell::new(Vec::new()));
        let received = Rc::new(RefCell::new(Vec::new()));

        let outbox_sink = outbox.clone();
        let received_sink = received.clone();
        let manager = PeerConnectionManager::new(
            PeerConnectionManagerOptions {
                local_peer_id: local_peer_id.to_string(),
                role,
                transport_config: TransportConfig {
                    ice_servers: vec![],
                    data_channel_label: "sync".to_string(),
                },
                on_signal: Callback::from(move |message: SignalingMessage| {
                    outbox_sink.borrow_mut().push(message)
                }),
                on_data_received: Callback::from(move |(peer_id, payload): (String, Vec<u8>)| {
                    received_sink.borrow_mut().push((peer_id, payload))
                }),
            },
            Rc::new(factory.clone()),
            hardware.clone(),
            registry.clone(),
            events.clone(),
        );

        Self {
            manager,
            hardware,
            backend,
            factory,
            registry,
            events,
            outbox,
            received,
        }
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Everything sent since the last call.
    pub fn take_outbox(&self) -> Vec<SignalingMessage> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }
}

pub fn drain(rx: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 1686052607 203.0.113.{n} 5{n:04} typ srflx"),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}

/// Same as [`candidate`], tagged with the ICE session it was gathered in.
pub fn candidate_in(n: u16, ufrag: &str) -> IceCandidate {
    IceCandidate {
        username_fragment: Some(ufrag.to_string()),
        ..candidate(n)
    }
}
