use async_trait::async_trait;
use tandem_core::{RelayMessage, SessionId};

/// Delivery side of the relay. The WebSocket layer implements it; tests swap
/// in a recorder.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Queue `message` for the session. Messages to one session are delivered
    /// in call order.
    async fn send(&self, session_id: SessionId, message: RelayMessage);
}
