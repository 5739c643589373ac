use crate::error::RelayError;
use tandem_core::{RoomId, SessionId};

/// Result of admitting a session to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub peer_count: usize,
    pub polite: bool,
    /// The occupant that was already waiting, if any. Only it is told about
    /// the newcomer.
    pub existing: Option<SessionId>,
}

/// What remains after a session leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub remaining: Option<SessionId>,
    /// Politeness of the remaining session after the departure.
    pub remaining_polite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Member {
    session_id: SessionId,
    polite: bool,
}

/// Membership of one room. Members are kept in join order; the first is
/// impolite and the second polite.
#[derive(Debug, Default)]
pub struct Room {
    members: Vec<Member>,
}

impl Room {
    pub const CAPACITY: usize = 2;

    pub fn admit(&mut self, room_id: &RoomId, session_id: SessionId) -> Result<Admission, RelayError> {
        if let Some(member) = self.find(session_id) {
            return Ok(Admission {
                peer_count: self.members.len(),
                polite: member.polite,
                existing: None,
            });
        }

        if self.members.len() >= Self::CAPACITY {
            return Err(RelayError::RoomFull {
                room: room_id.clone(),
            });
        }

        let existing = self.members.first().map(|m| m.session_id);
        let polite = existing.is_some();
        self.members.push(Member { session_id, polite });

        Ok(Admission {
            peer_count: self.members.len(),
            polite,
            existing,
        })
    }

    /// Removes `session_id`. The remaining member, if any, becomes the first
    /// occupant and therefore impolite.
    pub fn remove(&mut self, session_id: SessionId) -> Option<Departure> {
        let index = self.members.iter().position(|m| m.session_id == session_id)?;
        self.members.remove(index);

        let remaining = self.members.first_mut().map(|member| {
            member.polite = false;
            member.session_id
        });

        Some(Departure {
            remaining,
            remaining_polite: false,
        })
    }

    pub fn peer_of(&self, session_id: SessionId) -> Option<SessionId> {
        self.find(session_id)?;
        self.members
            .iter()
            .map(|m| m.session_id)
            .find(|id| *id != session_id)
    }

    pub fn is_polite(&self, session_id: SessionId) -> Option<bool> {
        self.find(session_id).map(|m| m.polite)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn find(&self, session_id: SessionId) -> Option<Member> {
        self.members
            .iter()
            .copied()
            .find(|m| m.session_id == session_id)
    }
}
