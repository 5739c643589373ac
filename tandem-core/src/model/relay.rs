use crate::model::signaling::{IceServerConfig, SignalMessage};
use serde::{Deserialize, Serialize};

/// Frames the relay sends to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum RelayMessage {
    #[serde(rename = "ice-servers-received")]
    IceServers(IceServerConfig),
    #[serde(rename_all = "camelCase")]
    Joined {
        peer_count: usize,
        polite: bool,
    },
    RoomFull,
    PeerConnected,
    PeerDisconnected {
        polite: bool,
    },
    Signal(SignalMessage),
}

/// Frames a session sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ClientMessage {
    Signal(SignalMessage),
    Leave,
}
