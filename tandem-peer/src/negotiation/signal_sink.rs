use crate::error::SignalingError;
use async_trait::async_trait;
use tandem_core::SignalMessage;

/// Outgoing half of signaling, as seen by a session.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn send_signal(&self, signal: SignalMessage) -> Result<(), SignalingError>;
}
