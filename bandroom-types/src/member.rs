//! Room membership: roles and the member value type.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A member's role within a room.
///
/// Role transitions are value replacements, not in-place mutation — see
/// [`Member`]'s doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    BandMember,
    Audience,
}

impl Role {
    /// Whether a member in this role is allowed to change the room tempo.
    pub fn can_change_tempo(self) -> bool {
        matches!(self, Role::Owner | Role::BandMember)
    }
}

/// A user currently present in a room (or awaiting approval in the
/// pending-members map).
///
/// Members are replaced wholesale when their role or state changes rather
/// than mutated field-by-field, so a cloned snapshot handed to a broadcast
/// can never observe a half-applied transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
    pub is_ready: bool,
    pub current_instrument: Option<String>,
    pub current_category: Option<String>,
}

impl Member {
    /// Build a fresh member for a brand new join. `is_ready` follows the rule
    /// in the join-room operation: audience and band members start ready,
    /// there's nothing for them to load before participating.
    pub fn new(user_id: UserId, display_name: String, role: Role) -> Self {
        let is_ready = matches!(role, Role::Audience | Role::BandMember);
        Self {
            user_id,
            display_name,
            role,
            is_ready,
            current_instrument: None,
            current_category: None,
        }
    }

    /// Replace just the display name, keeping everything else — used when
    /// restoring a member from a grace-period snapshot on reconnect.
    pub fn with_display_name(mut self, display_name: String) -> Self {
        self.display_name = display_name;
        self
    }

    /// Replace the role, demoting/promoting as ownership changes hands.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}
