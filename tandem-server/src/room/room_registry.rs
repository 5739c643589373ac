use crate::error::RelayError;
use crate::room::{Admission, Departure, Room};
use dashmap::DashMap;
use std::sync::Arc;
use tandem_core::{RoomId, SessionId};
use tracing::info;

/// The single source of truth for room membership.
///
/// Every join and leave runs while holding the room's map entry, so two
/// concurrent joins can never both see a free slot.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, room_id: &RoomId, session_id: SessionId) -> Result<Admission, RelayError> {
        let mut room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Creating room {}", room_id);
            Room::default()
        });
        room.admit(room_id, session_id)
    }

    pub fn leave(&self, room_id: &RoomId, session_id: SessionId) -> Option<Departure> {
        let departure = self.rooms.get_mut(room_id)?.remove(session_id);

        if self.rooms.remove_if(room_id, |_, room| room.is_empty()).is_some() {
            info!("Room {} is empty, releasing it", room_id);
        }

        departure
    }

    pub fn peer_of(&self, room_id: &RoomId, session_id: SessionId) -> Option<SessionId> {
        self.rooms.get(room_id)?.peer_of(session_id)
    }

    pub fn occupancy(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map(|room| room.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
