use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::Arc;
use tandem_core::{RelayMessage, SessionId};
use tokio::sync::mpsc;
use tracing::{error, warn};

struct SignalingInner {
    sessions: DashMap<SessionId, mpsc::UnboundedSender<Message>>,
}

/// Outgoing half of every open relay socket, keyed by session.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl Default for SignalingService {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                sessions: DashMap::new(),
            }),
        }
    }

    pub fn add_session(&self, session_id: SessionId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.sessions.insert(session_id, tx);
    }

    pub fn remove_session(&self, session_id: &SessionId) {
        self.inner.sessions.remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn send_message(&self, session_id: SessionId, msg: &RelayMessage) {
        let Some(session) = self.inner.sessions.get(&session_id) else {
            warn!("Attempted to send {:?} to disconnected session {}", msg, session_id);
            return;
        };

        match serde_json::to_string(msg) {
            Ok(json) => {
                if let Err(e) = session.send(Message::Text(json.into())) {
                    error!("Failed to queue WS message for {}: {:?}", session_id, e);
                }
            }
            Err(e) => error!("Failed to serialize relay message: {}", e),
        }
    }

    /// Asks the socket task to close the connection after draining what was
    /// already queued.
    pub fn close_session(&self, session_id: SessionId) {
        if let Some(session) = self.inner.sessions.get(&session_id) {
            let _ = session.send(Message::Close(None));
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn send(&self, session_id: SessionId, message: RelayMessage) {
        self.send_message(session_id, &message);
    }
}
