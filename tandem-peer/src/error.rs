use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),

    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),

    #[error("transport cannot do that in its current state: {0}")]
    InvalidState(String),

    #[error("transport or channel is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("gave up after {0} consecutive transport resets")]
    ResetLimitExceeded(u32),

    #[error("transport produced no local description")]
    MissingLocalDescription,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to encode or decode control message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),

    #[error("file '{name}' overflowed its declared size of {declared} bytes")]
    Oversized { name: String, declared: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("failed to connect to relay: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("relay connection is closed")]
    Disconnected,

    #[error("failed to encode signaling message: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("peer has already left the room")]
    Stopped,
}
