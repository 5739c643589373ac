use tandem_core::RoomId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("room {room} already has two participants")]
    RoomFull { room: RoomId },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address '{value}': {source}")]
    ListenAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}
