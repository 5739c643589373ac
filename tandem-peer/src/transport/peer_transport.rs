use crate::error::TransportError;
use crate::negotiation::SignalingState;
use crate::transport::{DataChannel, TransportEventSink};
use async_trait::async_trait;
use std::sync::Arc;
use tandem_core::{IceCandidate, IceServerConfig, SessionDescription};
use webrtc::track::track_local::TrackLocal;

pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

/// One peer-to-peer transport session. A reset replaces the whole object;
/// nothing is ever reused across generations.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn generation(&self) -> u64;

    fn signaling_state(&self) -> SignalingState;

    /// Parameterless form: creates and applies whatever description the
    /// current state calls for. Transports without it return
    /// [`TransportError::Unsupported`] and the caller falls back to the
    /// explicit two-step path.
    async fn set_local_description_implicit(&self) -> Result<(), TransportError>;

    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn add_track(&self, track: LocalTrack) -> Result<(), TransportError>;

    /// The pre-negotiated chat channel. Both sides create it with the same
    /// fixed id, so it never shows up as a remote channel.
    async fn open_control_channel(&self) -> Result<Arc<dyn DataChannel>, TransportError>;

    async fn open_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Builds transports. Called once per session start and once per reset,
/// always with the same server list.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &IceServerConfig,
        sink: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError>;
}
