//! Room snapshot types — the serializable view of a room handed to clients.

use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, UserId};
use crate::member::Member;

/// The metronome's persisted configuration. Runtime scheduling state (next
/// expected tick, drift stats) lives in the metronome engine, not here — see
/// `bandroom_core::metronome`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetronomeConfig {
    pub bpm: u32,
    pub last_tick_timestamp_ms: u64,
}

impl MetronomeConfig {
    pub fn new(bpm: u32, now_ms: u64) -> Self {
        Self {
            bpm,
            last_tick_timestamp_ms: now_ms,
        }
    }
}

/// A full, consistent view of a room at a point in time.
///
/// This is what gets handed to serde for `room_created`, `room_joined`, and
/// `room_state_updated` — never a live reference into the store, so a
/// broadcast can be composed and sent without holding the room's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub name: String,
    pub owner: UserId,
    pub users: Vec<Member>,
    pub pending_members: Vec<Member>,
    pub is_private: bool,
    pub is_hidden: bool,
    pub created_at_ms: u64,
    pub metronome: MetronomeConfig,
}

impl RoomSnapshot {
    pub fn member(&self, user_id: &UserId) -> Option<&Member> {
        self.users.iter().find(|m| &m.user_id == user_id)
    }

    pub fn pending_member(&self, user_id: &UserId) -> Option<&Member> {
        self.pending_members.iter().find(|m| &m.user_id == user_id)
    }

    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.member(user_id).is_some()
    }
}

/// The lightweight summary broadcast globally whenever a room is created —
/// deliberately excludes membership detail that non-participants don't need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub user_count: usize,
    pub owner: UserId,
    pub is_private: bool,
    pub is_hidden: bool,
    pub created_at_ms: u64,
}

impl From<&RoomSnapshot> for RoomSummary {
    fn from(room: &RoomSnapshot) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            user_count: room.users.len(),
            owner: room.owner.clone(),
            is_private: room.is_private,
            is_hidden: room.is_hidden,
            created_at_ms: room.created_at_ms,
        }
    }
}
