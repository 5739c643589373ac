use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tandem_core::Frame;

static NEXT_CHANNEL_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique key for a data channel object. Transport-assigned stream
/// ids are not known until the channel opens, so events refer to this instead.
pub fn next_channel_key() -> u64 {
    NEXT_CHANNEL_KEY.fetch_add(1, Ordering::Relaxed)
}

/// A bidirectional message pipe provided by a peer transport.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn key(&self) -> u64;

    fn label(&self) -> &str;

    fn is_open(&self) -> bool;

    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    async fn send_binary(&self, data: Bytes) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        match frame {
            Frame::Text(text) => self.send_text(text).await,
            Frame::Binary(data) => self.send_binary(data).await,
        }
    }
}
