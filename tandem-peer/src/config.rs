use tandem_core::RoomId;

/// Where and as whom a peer joins.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Base relay URL, e.g. `ws://127.0.0.1:3000`.
    pub relay_url: String,
    pub room: RoomId,
    pub display_name: String,
}

impl PeerConfig {
    pub fn new(relay_url: impl Into<String>, room: RoomId, display_name: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            room,
            display_name: display_name.into(),
        }
    }

    /// Full WebSocket URL of this room on the relay.
    pub fn room_url(&self) -> String {
        format!("{}/ws/{}", self.relay_url.trim_end_matches('/'), self.room)
    }
}
