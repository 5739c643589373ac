use std::time::{SystemTime, UNIX_EPOCH};

/// Public STUN server used whenever traversal credentials are unavailable.
pub const DEFAULT_STUN_ADDR: &str = "stun:stun2.l.google.com:19302";

/// Size of one binary frame of a file transfer.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Stream id of the pre-negotiated chat channel. Both peers create it with
/// this id, so it never shows up as an incoming channel.
pub const CONTROL_CHANNEL_ID: u16 = 0;

pub const CONTROL_CHANNEL_LABEL: &str = "chat";

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
