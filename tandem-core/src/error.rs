use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    #[error("room id is empty")]
    Empty,

    #[error("room id '{0}' must look like word-word (lowercase letters, two or more each)")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum SignalFormatError {
    #[error("signal carries neither a description nor a candidate")]
    Empty,

    #[error("signal carries both a description and a candidate")]
    Ambiguous,

    #[error("description of type '{0}' has no sdp")]
    MissingSdp(String),

    #[error("unknown description type '{0}'")]
    UnknownType(String),
}
