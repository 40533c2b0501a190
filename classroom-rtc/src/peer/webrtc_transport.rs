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

//! [`TransportFactory`] backed by the `webrtc` crate.
//!
//! Every callback the peer connection and its data channel raise is forwarded
//! as a [`TransportEvent`] through the transport's sink; nothing here touches
//! engine state directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use classroom_types::{Callback, IceCandidate, MediaKind, SdpType, SessionDescription};
use log::{debug, info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::transport::{
    PeerTransport, TransportConfig, TransportError, TransportEvent, TransportEventSink,
    TransportFactory, TransportState,
};
use crate::constants::{AUDIO_SAMPLE_RATE, VIDEO_CLOCK_RATE};
use crate::media_devices::LocalTrack;
use crate::registry::RemoteStream;

impl From<webrtc::Error> for TransportError {
    fn from(e: webrtc::Error) -> Self {
        TransportError::new(e.to_string())
    }
}

/// A sample track created for one local capture track, handed to whoever
/// encodes frames for it.
#[derive(Clone)]
pub struct LocalSampleTrack {
    pub peer_id: String,
    pub kind: MediaKind,
    pub track: Arc<TrackLocalStaticSample>,
}

/// Builds one `webrtc` peer connection per remote peer.
///
/// The media engine carries the default codec set (Opus, VP8, VP9, H.264) and
/// the default interceptors. Encoded samples are written by the application
/// into the tracks announced through [`on_local_track`](Self::on_local_track).
pub struct WebRtcTransportFactory {
    api: API,
    stream_id: String,
    on_local_track: Callback<LocalSampleTrack>,
}

impl WebRtcTransportFactory {
    pub fn new() -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();
        Ok(Self {
            api,
            stream_id: format!("classroom-{}", Uuid::new_v4()),
            on_local_track: Callback::noop(),
        })
    }

    /// Called once per local track added to a connection.
    pub fn on_local_track(mut self, callback: Callback<LocalSampleTrack>) -> Self {
        self.on_local_track = callback;
        self
    }

    /// Media stream id shared by every local track this factory attaches.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

#[async_trait(?Send)]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        config: &TransportConfig,
        events: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError> {
        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(rtc_config).await?);
        let data_channel = Arc::new(Mutex::new(None));
        forward_peer_connection_events(
            &pc,
            &events,
            &config.data_channel_label,
            data_channel.clone(),
        );
        info!(
            "webrtc transport {} created for {}",
            events.generation(),
            peer_id
        );
        Ok(Box::new(WebRtcTransport {
            pc,
            data_channel,
            events,
            stream_id: self.stream_id.clone(),
            on_local_track: self.on_local_track.clone(),
            closed: false,
        }))
    }
}

struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    // Created locally by the offerer, announced by the remote side for the answerer
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    events: TransportEventSink,
    stream_id: String,
    on_local_track: Callback<LocalSampleTrack>,
    closed: bool,
}

fn forward_peer_connection_events(
    pc: &RTCPeerConnection,
    events: &TransportEventSink,
    label: &str,
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
) {
    let sink = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = sink.clone();
        Box::pin(async move {
            // None marks the end of gathering
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => {
                    sink.send(TransportEvent::LocalCandidate(from_rtc_candidate(init)));
                }
                Err(e) => warn!("unserializable local candidate for {}: {}", sink.peer_id(), e),
            }
        })
    }));

    let sink = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let sink = sink.clone();
        Box::pin(async move {
            let state = match state {
                RTCPeerConnectionState::Connecting => TransportState::Connecting,
                RTCPeerConnectionState::Connected => TransportState::Connected,
                RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                RTCPeerConnectionState::Failed => TransportState::Failed,
                RTCPeerConnectionState::Closed => TransportState::Closed,
                _ => return,
            };
            debug!("{} transport state {:?}", sink.peer_id(), state);
            sink.send(TransportEvent::StateChanged(state));
        })
    }));

    let sink = events.clone();
    let streams: Arc<Mutex<HashMap<String, Vec<MediaKind>>>> = Arc::new(Mutex::new(HashMap::new()));
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let sink = sink.clone();
            let streams = streams.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Microphone,
                    RTPCodecType::Video => MediaKind::Camera,
                    _ => return,
                };
                let stream_id = track.stream_id();
                let kinds = {
                    let mut streams = streams.lock().await;
                    let kinds = streams.entry(stream_id.clone()).or_default();
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                        kinds.sort();
                    }
                    kinds.clone()
                };
                sink.send(TransportEvent::RemoteTrack(RemoteStream::new(stream_id, kinds)));
            })
        },
    ));

    let sink = events.clone();
    let label = label.to_string();
    pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        let sink = sink.clone();
        let label = label.clone();
        let data_channel = data_channel.clone();
        Box::pin(async move {
            if channel.label() != label {
                debug!(
                    "ignoring data channel '{}' from {}",
                    channel.label(),
                    sink.peer_id()
                );
                return;
            }
            forward_data_channel_events(&channel, &sink);
            *data_channel.lock().await = Some(channel);
        })
    }));
}

fn forward_data_channel_events(channel: &RTCDataChannel, events: &TransportEventSink) {
    let sink = events.clone();
    channel.on_open(Box::new(move || {
        Box::pin(async move {
            sink.send(TransportEvent::DataChannelOpen);
        })
    }));

    let sink = events.clone();
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.send(TransportEvent::DataReceived(message.data.to_vec()));
        })
    }));

    let sink = events.clone();
    channel.on_close(Box::new(move || {
        let sink = sink.clone();
        Box::pin(async move {
            sink.send(TransportEvent::DataChannelClosed);
        })
    }));
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_rtc_description(
    description: SessionDescription,
) -> Result<RTCSessionDescription, TransportError> {
    let description = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
    };
    Ok(description)
}

fn from_rtc_description(
    description: RTCSessionDescription,
) -> Result<SessionDescription, TransportError> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(description.sdp)),
        other => Err(TransportError::new(format!(
            "unsupported description type {other}"
        ))),
    }
}

impl WebRtcTransport {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::new("transport closed"));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl PeerTransport for WebRtcTransport {
    async fn add_track(&mut self, track: &LocalTrack) -> Result<(), TransportError> {
        self.ensure_open()?;
        let capability = match track.kind() {
            MediaKind::Camera => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: VIDEO_CLOCK_RATE,
                ..Default::default()
            },
            MediaKind::Microphone => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: AUDIO_SAMPLE_RATE,
                channels: 2,
                ..Default::default()
            },
        };
        let sample_track = Arc::new(TrackLocalStaticSample::new(
            capability,
            track.id().to_string(),
            self.stream_id.clone(),
        ));
        self.pc
            .add_track(sample_track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        self.on_local_track.emit(LocalSampleTrack {
            peer_id: self.events.peer_id().to_string(),
            kind: track.kind(),
            track: sample_track,
        });
        Ok(())
    }

    async fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let channel = self.pc.create_data_channel(label, None).await?;
        forward_data_channel_events(&channel, &self.events);
        *self.data_channel.lock().await = Some(channel);
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        from_rtc_description(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        from_rtc_description(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.pc
            .set_local_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.pc
            .set_remote_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn send_data(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let channel = self.data_channel.lock().await.clone();
        let Some(channel) = channel else {
            return Err(TransportError::new("no data channel"));
        };
        channel.send(&Bytes::copy_from_slice(payload)).await?;
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let pc = self.pc.clone();
        let peer_id = self.events.peer_id().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = pc.close().await {
                        warn!("closing peer connection to {} failed: {}", peer_id, e);
                    }
                });
            }
            Err(_) => warn!(
                "no runtime to close the peer connection to {}, leaving it to drop",
                peer_id
            ),
        }
    }
}
