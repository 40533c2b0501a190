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

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use classroom_types::{Callback, IceCandidate, MediaKind, SessionDescription};
use log::debug;

use crate::media_devices::LocalTrack;
use crate::peer::{
    PeerTransport, TransportConfig, TransportError, TransportEvent, TransportEventSink,
    TransportFactory, TransportState,
};
use crate::registry::RemoteStream;

const APPLICATION_SECTION: &str = "m=application 9 UDP/DTLS/SCTP webrtc-datachannel";

struct FactoryState {
    created: Vec<FakeTransportHandle>,
    auto_connect: bool,
    fail_create: bool,
    fail_remote_description: bool,
    remote_peers: HashMap<String, Callback<Vec<u8>>>,
}

/// Creates transports that negotiate against nothing and connect as soon as both
/// descriptions are set.
///
/// Bytes a transport writes on its data channel are recorded and, when a remote end
/// was registered with [`connect_remote_peer`](Self::connect_remote_peer), delivered to it.
#[derive(Clone)]
pub struct LoopbackTransportFactory {
    state: Rc<RefCell<FactoryState>>,
}

impl Default for LoopbackTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransportFactory {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(FactoryState {
                created: Vec::new(),
                auto_connect: true,
                fail_create: false,
                fail_remote_description: false,
                remote_peers: HashMap::new(),
            })),
        }
    }

    /// With auto connect off, tests drive the transport state through the handles.
    pub fn set_auto_connect(&self, value: bool) {
        self.state.borrow_mut().auto_connect = value;
    }

    pub fn set_fail_create(&self, value: bool) {
        self.state.borrow_mut().fail_create = value;
    }

    pub fn set_fail_remote_description(&self, value: bool) {
        self.state.borrow_mut().fail_remote_description = value;
    }

    /// Delivers everything sent to `peer_id` to `on_data`, as that peer's data channel would.
    pub fn connect_remote_peer(&self, peer_id: &str, on_data: Callback<Vec<u8>>) {
        self.state
            .borrow_mut()
            .remote_peers
            .insert(peer_id.to_string(), on_data);
    }

    /// Every transport created so far, oldest first.
    pub fn created(&self) -> Vec<FakeTransportHandle> {
        self.state.borrow().created.clone()
    }

    pub fn created_count(&self) -> usize {
        self.state.borrow().created.len()
    }

    /// The most recent transport created for `peer_id`.
    pub fn latest(&self, peer_id: &str) -> Option<FakeTransportHandle> {
        self.state
            .borrow()
            .created
            .iter()
            .rev()
            .find(|handle| handle.peer_id() == peer_id)
            .cloned()
    }
}

#[async_trait(?Send)]
impl TransportFactory for LoopbackTransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        _config: &TransportConfig,
        events: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError> {
        let mut factory = self.state.borrow_mut();
        if factory.fail_create {
            return Err(TransportError::new("transport creation refused"));
        }
        let handle = FakeTransportHandle {
            state: Rc::new(RefCell::new(TransportRecord::default())),
            events,
        };
        factory.created.push(handle.clone());
        debug!(
            "loopback transport {} created for {}",
            handle.generation(),
            peer_id
        );
        Ok(Box::new(FakeTransport {
            handle,
            factory: self.state.clone(),
        }))
    }
}

#[derive(Default)]
struct TransportRecord {
    attached: Vec<MediaKind>,
    data_channels: Vec<String>,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    sent: Vec<Vec<u8>>,
    connected: bool,
    closed: bool,
}

/// Test-side view of one loopback transport.
#[derive(Clone)]
pub struct FakeTransportHandle {
    state: Rc<RefCell<TransportRecord>>,
    events: TransportEventSink,
}

impl FakeTransportHandle {
    pub fn peer_id(&self) -> &str {
        self.events.peer_id()
    }

    pub fn generation(&self) -> u64 {
        self.events.generation()
    }

    /// ICE username fragment written into this transport's descriptions and candidates.
    pub fn ufrag(&self) -> String {
        format!("lb{}", self.generation())
    }

    pub fn attached_kinds(&self) -> Vec<MediaKind> {
        self.state.borrow().attached.clone()
    }

    pub fn data_channels(&self) -> Vec<String> {
        self.state.borrow().data_channels.clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.borrow().local_description.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.borrow().remote_description.clone()
    }

    /// Remote candidates handed to the ICE agent, in order.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state.borrow().applied_candidates.clone()
    }

    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn emit_local_candidate(&self, candidate: IceCandidate) {
        self.events.send(TransportEvent::LocalCandidate(candidate));
    }

    pub fn inject_remote_track(&self, stream: RemoteStream) {
        self.events.send(TransportEvent::RemoteTrack(stream));
    }

    pub fn inject_data(&self, payload: Vec<u8>) {
        self.events.send(TransportEvent::DataReceived(payload));
    }

    /// Reports the ICE layer as connected, as if connectivity checks succeeded.
    pub fn connect(&self) {
        self.state.borrow_mut().connected = true;
        self.events
            .send(TransportEvent::StateChanged(TransportState::Connected));
    }

    pub fn open_data_channel(&self) {
        self.events.send(TransportEvent::DataChannelOpen);
    }

    pub fn disconnect(&self) {
        self.state.borrow_mut().connected = false;
        self.events
            .send(TransportEvent::StateChanged(TransportState::Disconnected));
    }

    pub fn fail(&self) {
        self.state.borrow_mut().connected = false;
        self.events
            .send(TransportEvent::StateChanged(TransportState::Failed));
    }
}

struct FakeTransport {
    handle: FakeTransportHandle,
    factory: Rc<RefCell<FactoryState>>,
}

impl FakeTransport {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.handle.state.borrow().closed {
            return Err(TransportError::new("transport closed"));
        }
        Ok(())
    }

    fn describe(&self, with_application: bool) -> String {
        let state = self.handle.state.borrow();
        let mut sdp = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=ice-ufrag:{}\r\n",
            self.handle.generation(),
            self.handle.ufrag()
        );
        for kind in &state.attached {
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF 96\r\n", kind.sdp_media()));
        }
        if with_application {
            sdp.push_str(APPLICATION_SECTION);
            sdp.push_str("\r\n");
        }
        sdp
    }

    fn remote_has_application(&self) -> bool {
        self.handle
            .state
            .borrow()
            .remote_description
            .as_ref()
            .map(|d| d.sdp.contains(APPLICATION_SECTION))
            .unwrap_or(false)
    }

    // Both descriptions in place: ICE "succeeds" and the data channel opens
    fn maybe_connect(&self) {
        if !self.factory.borrow().auto_connect {
            return;
        }
        let has_channel = {
            let mut state = self.handle.state.borrow_mut();
            if state.connected
                || state.local_description.is_none()
                || state.remote_description.is_none()
            {
                return;
            }
            state.connected = true;
            !state.data_channels.is_empty()
        };
        let events = &self.handle.events;
        events.send(TransportEvent::StateChanged(TransportState::Connecting));
        events.send(TransportEvent::StateChanged(TransportState::Connected));
        if has_channel || self.remote_has_application() {
            events.send(TransportEvent::DataChannelOpen);
        }
    }
}

#[async_trait(?Send)]
impl PeerTransport for FakeTransport {
    async fn add_track(&mut self, track: &LocalTrack) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.handle.state.borrow_mut().attached.push(track.kind());
        Ok(())
    }

    async fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.handle
            .state
            .borrow_mut()
            .data_channels
            .push(label.to_string());
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        let with_application = !self.handle.state.borrow().data_channels.is_empty();
        Ok(SessionDescription::offer(self.describe(with_application)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        if self.handle.state.borrow().remote_description.is_none() {
            return Err(TransportError::new("no remote offer to answer"));
        }
        Ok(SessionDescription::answer(
            self.describe(self.remote_has_application()),
        ))
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.handle.state.borrow_mut().local_description = Some(description);
        // Gathering starts with the local description
        let port = 50000 + self.handle.generation();
        self.handle.events.send(TransportEvent::LocalCandidate(IceCandidate {
            candidate: format!("candidate:1 1 udp 2122260223 127.0.0.1 {port} typ host"),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: Some(self.handle.ufrag()),
        }));
        self.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.factory.borrow().fail_remote_description {
            return Err(TransportError::new("malformed remote description"));
        }
        self.handle.state.borrow_mut().remote_description = Some(description);
        self.maybe_connect();
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.handle.state.borrow_mut();
        if state.remote_description.is_none() {
            return Err(TransportError::new(
                "candidate added before the remote description",
            ));
        }
        state.applied_candidates.push(candidate);
        Ok(())
    }

    async fn send_data(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.handle.state.borrow_mut().sent.push(payload.to_vec());
        let remote = self
            .factory
            .borrow()
            .remote_peers
            .get(self.handle.peer_id())
            .cloned();
        if let Some(remote) = remote {
            remote.emit(payload.to_vec());
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.handle.state.borrow_mut();
        state.connected = false;
        state.closed = true;
    }
}
