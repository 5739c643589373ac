use crate::error::SignalFormatError;
use crate::utils::DEFAULT_STUN_ADDR;
use serde::{Deserialize, Deserializer, Serialize};

/// One traversal server. `urls` accepts either a single string or a list on
/// input, the two shapes browsers and credential services produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Urls {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Urls::deserialize(deserializer)? {
        Urls::One(url) => vec![url],
        Urls::Many(urls) => urls,
    })
}

/// Ordered list of traversal servers handed to a peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceServerConfig(pub Vec<IceServer>);

impl IceServerConfig {
    /// The fallback list: exactly one public STUN-only entry.
    pub fn default_servers() -> Self {
        Self(vec![IceServer::stun(DEFAULT_STUN_ADDR)])
    }

    pub fn servers(&self) -> &[IceServer] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self::default_servers()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Pranswer => "pranswer",
            Self::Rollback => "rollback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }

    pub fn is_answer(&self) -> bool {
        self.sdp_type == SdpType::Answer
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// The empty trailing candidate that marks the end of gathering.
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// Payload exchanged between the two sessions of a room. The relay forwards
/// it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignalPayload", into = "SignalPayload")]
pub enum SignalMessage {
    Description(SessionDescription),
    Candidate(IceCandidate),
    /// Asks the receiver to rebuild its transport.
    Reset,
}

const RESET_MARKER: &str = "_reset";

#[derive(Serialize, Deserialize)]
struct SignalPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<WireDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    candidate: Option<IceCandidate>,
}

#[derive(Serialize, Deserialize)]
struct WireDescription {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sdp: Option<String>,
}

impl TryFrom<SignalPayload> for SignalMessage {
    type Error = SignalFormatError;

    fn try_from(payload: SignalPayload) -> Result<Self, Self::Error> {
        match (payload.description, payload.candidate) {
            (None, None) => Err(SignalFormatError::Empty),
            (Some(_), Some(_)) => Err(SignalFormatError::Ambiguous),
            (None, Some(candidate)) => Ok(Self::Candidate(candidate)),
            (Some(description), None) => {
                let sdp_type = match description.kind.as_str() {
                    RESET_MARKER => return Ok(Self::Reset),
                    "offer" => SdpType::Offer,
                    "answer" => SdpType::Answer,
                    "pranswer" => SdpType::Pranswer,
                    "rollback" => SdpType::Rollback,
                    other => return Err(SignalFormatError::UnknownType(other.to_owned())),
                };
                let sdp = match (sdp_type, description.sdp) {
                    (_, Some(sdp)) => sdp,
                    (SdpType::Rollback, None) => String::new(),
                    (_, None) => return Err(SignalFormatError::MissingSdp(description.kind)),
                };
                Ok(Self::Description(SessionDescription { sdp_type, sdp }))
            }
        }
    }
}

impl From<SignalMessage> for SignalPayload {
    fn from(message: SignalMessage) -> Self {
        match message {
            SignalMessage::Description(description) => Self {
                description: Some(WireDescription {
                    kind: description.sdp_type.as_str().to_owned(),
                    sdp: Some(description.sdp),
                }),
                candidate: None,
            },
            SignalMessage::Candidate(candidate) => Self {
                description: None,
                candidate: Some(candidate),
            },
            SignalMessage::Reset => Self {
                description: Some(WireDescription {
                    kind: RESET_MARKER.to_owned(),
                    sdp: None,
                }),
                candidate: None,
            },
        }
    }
}
