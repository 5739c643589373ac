use crate::error::TransportError;
use crate::negotiation::SignalingState;
use crate::transport::{
    DataChannel, LocalTrack, PeerTransport, TransportEvent, TransportEventSink, TransportFactory,
    next_channel_key,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tandem_core::utils::{CONTROL_CHANNEL_ID, CONTROL_CHANNEL_LABEL};
use tandem_core::{ConnectionState, Frame, IceCandidate, IceServerConfig, SdpType, SessionDescription};
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

/// Builds [`WebRtcTransport`]s backed by webrtc-rs.
#[derive(Debug, Clone, Default)]
pub struct WebRtcTransportFactory;

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        ice_servers: &IceServerConfig,
        sink: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError> {
        Ok(Box::new(WebRtcTransport::new(ice_servers, sink).await?))
    }
}

pub struct WebRtcTransport {
    generation: u64,
    peer_connection: Arc<RTCPeerConnection>,
    sink: TransportEventSink,
}

impl WebRtcTransport {
    pub async fn new(ice_servers: &IceServerConfig, sink: TransportEventSink) -> Result<Self, TransportError> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .servers()
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let generation = sink.generation();

        let negotiation_sink = sink.clone();
        peer_connection.on_negotiation_needed(Box::new(move || {
            let sink = negotiation_sink.clone();
            Box::pin(async move {
                sink.emit(TransportEvent::NegotiationNeeded);
            })
        }));

        let state_sink = sink.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let sink = state_sink.clone();
            Box::pin(async move {
                info!("Peer connection state of generation {} changed: {:?}", sink.generation(), s);
                let state = match s {
                    RTCPeerConnectionState::New | RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                    RTCPeerConnectionState::Connected => ConnectionState::Connected,
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => ConnectionState::Disconnected,
                    RTCPeerConnectionState::Unspecified => return,
                };
                sink.emit(TransportEvent::ConnectionStateChanged(state));
            })
        }));

        let ice_sink = sink.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let sink = ice_sink.clone();
            Box::pin(async move {
                let candidate = match c {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => from_candidate_init(init),
                        Err(e) => {
                            debug!("Skipping unserializable local candidate: {}", e);
                            return;
                        }
                    },
                    None => IceCandidate::default(),
                };
                sink.emit(TransportEvent::IceCandidate(candidate));
            })
        }));

        let dc_sink = sink.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let sink = dc_sink.clone();
            Box::pin(async move {
                debug!("Remote opened data channel '{}'", dc.label());
                let channel = WebRtcDataChannel::wire(dc, &sink);
                sink.emit(TransportEvent::RemoteChannel(channel));
            })
        }));

        Ok(Self {
            generation,
            peer_connection,
            sink,
        })
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn signaling_state(&self) -> SignalingState {
        match self.peer_connection.signaling_state() {
            RTCSignalingState::Stable | RTCSignalingState::Unspecified => SignalingState::Stable,
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
        }
    }

    async fn set_local_description_implicit(&self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("parameterless set_local_description"))
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        from_rtc_description(self.peer_connection.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        from_rtc_description(self.peer_connection.create_answer(None).await?)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.peer_connection
            .set_local_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        if description.is_offer() && self.signaling_state() == SignalingState::HaveLocalOffer {
            debug!("Rolling back local offer of generation {}", self.generation);
            self.peer_connection.set_local_description(rollback()).await?;
        }
        self.peer_connection
            .set_remote_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.peer_connection.local_description().await?;
        from_rtc_description(description).ok()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn add_track(&self, track: LocalTrack) -> Result<(), TransportError> {
        self.peer_connection.add_track(track).await?;
        Ok(())
    }

    async fn open_control_channel(&self) -> Result<Arc<dyn DataChannel>, TransportError> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            negotiated: Some(CONTROL_CHANNEL_ID),
            ..Default::default()
        };
        let dc = self
            .peer_connection
            .create_data_channel(CONTROL_CHANNEL_LABEL, Some(init))
            .await?;
        Ok(WebRtcDataChannel::wire(dc, &self.sink))
    }

    async fn open_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, TransportError> {
        let dc = self
            .peer_connection
            .create_data_channel(label, Some(RTCDataChannelInit::default()))
            .await?;
        Ok(WebRtcDataChannel::wire(dc, &self.sink))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

pub struct WebRtcDataChannel {
    key: u64,
    label: String,
    inner: Arc<RTCDataChannel>,
}

impl WebRtcDataChannel {
    /// Wraps `dc` and routes its open, message and close callbacks into `sink`.
    fn wire(dc: Arc<RTCDataChannel>, sink: &TransportEventSink) -> Arc<dyn DataChannel> {
        let channel: Arc<dyn DataChannel> = Arc::new(Self {
            key: next_channel_key(),
            label: dc.label().to_owned(),
            inner: dc.clone(),
        });
        let key = channel.key();

        // the callback lives inside `dc`, so it must not own the wrapper
        let open_sink = sink.clone();
        let open_channel = Arc::downgrade(&channel);
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                let Some(channel) = open_channel.upgrade() else {
                    return;
                };
                debug!("Data channel '{}' open", channel.label());
                open_sink.emit(TransportEvent::ChannelOpen(channel));
            })
        }));

        let msg_sink = sink.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let sink = msg_sink.clone();
            Box::pin(async move {
                let frame = if msg.is_string {
                    Frame::Text(String::from_utf8_lossy(&msg.data).into_owned())
                } else {
                    Frame::Binary(msg.data)
                };
                sink.emit(TransportEvent::ChannelMessage { key, frame });
            })
        }));

        let close_sink = sink.clone();
        dc.on_close(Box::new(move || {
            let sink = close_sink.clone();
            Box::pin(async move {
                sink.emit(TransportEvent::ChannelClosed { key });
            })
        }));

        channel
    }
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn key(&self) -> u64 {
        self.key
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.inner.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.inner.send_text(text).await?;
        Ok(())
    }

    async fn send_binary(&self, data: Bytes) -> Result<(), TransportError> {
        self.inner.send(&data).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.close().await?;
        Ok(())
    }
}

fn rollback() -> RTCSessionDescription {
    let mut description = RTCSessionDescription::default();
    description.sdp_type = RTCSdpType::Rollback;
    description
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    Ok(match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpType::Rollback => rollback(),
    })
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription, TransportError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(TransportError::InvalidState("description without a type".into()));
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn from_candidate_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}
