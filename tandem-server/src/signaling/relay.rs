use crate::error::RelayError;
use crate::ice::IceServerSource;
use crate::room::RoomRegistry;
use crate::signaling::SignalingOutput;
use std::sync::Arc;
use tandem_core::{IceServerConfig, RelayMessage, RoomId, SessionId, SignalMessage};
use tracing::{debug, info, warn};

struct RelayInner {
    rooms: RoomRegistry,
    output: Arc<dyn SignalingOutput>,
    ice: Arc<dyn IceServerSource>,
}

/// Pairs at most two sessions per room and forwards signaling payloads
/// between them without looking inside.
#[derive(Clone)]
pub struct SignalingRelay {
    inner: Arc<RelayInner>,
}

impl SignalingRelay {
    pub fn new(output: Arc<dyn SignalingOutput>, ice: Arc<dyn IceServerSource>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                rooms: RoomRegistry::new(),
                output,
                ice,
            }),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.inner.rooms
    }

    /// Admits the session and answers it with `joined`. When another session
    /// was already waiting, that session (and only that one) gets
    /// `peer-connected`.
    pub async fn join(&self, room_id: &RoomId, session_id: SessionId) -> Result<usize, RelayError> {
        let admission = match self.inner.rooms.join(room_id, session_id) {
            Ok(admission) => admission,
            Err(e) => {
                warn!("Session {} rejected from {}: {}", session_id, room_id, e);
                self.inner.output.send(session_id, RelayMessage::RoomFull).await;
                return Err(e);
            }
        };

        info!(
            "Session {} joined {} ({} present, polite: {})",
            session_id, room_id, admission.peer_count, admission.polite
        );

        self.inner
            .output
            .send(
                session_id,
                RelayMessage::Joined {
                    peer_count: admission.peer_count,
                    polite: admission.polite,
                },
            )
            .await;

        if let Some(existing) = admission.existing {
            self.inner.output.send(existing, RelayMessage::PeerConnected).await;
        }

        Ok(admission.peer_count)
    }

    /// Forwards `message` to the sender's peer. Returns `false` when it was
    /// dropped because the sender is alone or not a member.
    pub async fn relay(&self, room_id: &RoomId, sender: SessionId, message: SignalMessage) -> bool {
        let Some(peer) = self.inner.rooms.peer_of(room_id, sender) else {
            debug!("Dropping signal from {} in {}: no peer", sender, room_id);
            return false;
        };

        self.inner.output.send(peer, RelayMessage::Signal(message)).await;
        true
    }

    /// Removes the session. Calling it twice is harmless.
    pub async fn leave(&self, room_id: &RoomId, session_id: SessionId) {
        let Some(departure) = self.inner.rooms.leave(room_id, session_id) else {
            return;
        };
        info!("Session {} left {}", session_id, room_id);

        if let Some(remaining) = departure.remaining {
            self.inner
                .output
                .send(
                    remaining,
                    RelayMessage::PeerDisconnected {
                        polite: departure.remaining_polite,
                    },
                )
                .await;
        }
    }

    pub async fn resolve_ice_servers(&self, session_id: SessionId) -> IceServerConfig {
        self.inner.ice.ice_servers(session_id).await
    }
}
