use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Application message carried over the data path.
///
/// Everything except `ImageChunk` travels as a JSON text frame. Chunks are
/// raw binary frames, so [`ControlMessage::into_frame`] and
/// [`ControlMessage::from_frame`] are the only supported codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ControlMessage {
    Text {
        sender: String,
        body: String,
        timestamp: u64,
    },
    ImageMeta {
        name: String,
        mime: String,
        size: u64,
        timestamp: u64,
    },
    ImageChunk {
        #[serde(with = "serde_bytes")]
        bytes: Vec<u8>,
    },
    Ack {
        correlates_to_timestamp: u64,
        acked_at: u64,
    },
}

/// One data-channel frame as the transport sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl ControlMessage {
    /// Timestamp an acknowledgment for this message must carry, if the
    /// message is acknowledged at all.
    pub fn ack_timestamp(&self) -> Option<u64> {
        match self {
            Self::Text { timestamp, .. } | Self::ImageMeta { timestamp, .. } => Some(*timestamp),
            Self::ImageChunk { .. } | Self::Ack { .. } => None,
        }
    }

    pub fn into_frame(self) -> Result<Frame, serde_json::Error> {
        match self {
            Self::ImageChunk { bytes } => Ok(Frame::Binary(Bytes::from(bytes))),
            other => serde_json::to_string(&other).map(Frame::Text),
        }
    }

    pub fn from_frame(frame: Frame) -> Result<Self, serde_json::Error> {
        match frame {
            Frame::Binary(bytes) => Ok(Self::ImageChunk {
                bytes: bytes.to_vec(),
            }),
            Frame::Text(text) => serde_json::from_str(&text),
        }
    }
}
