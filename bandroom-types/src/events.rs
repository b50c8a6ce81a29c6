//! Inbound and outbound event payloads exchanged with the transport layer.
//!
//! These are the only types the transport and the coordinator agree on — the
//! transport's framing, multiplexing, and wire format are its own business
//! (see `bandroom-net`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{RoomId, UserId};
use crate::member::{Member, Role};
use crate::room::{RoomSnapshot, RoomSummary};

/// Events a client may send in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    CreateRoom {
        name: String,
        username: String,
        user_id: UserId,
        #[serde(default)]
        is_private: bool,
        #[serde(default)]
        is_hidden: bool,
    },
    JoinRoom {
        room_id: RoomId,
        username: String,
        user_id: UserId,
        role: Role,
    },
    LeaveRoom {},
    UpdateMetronome {
        /// Deliberately untyped: the coordinator must tolerate `null` and
        /// non-numeric payloads by rejecting them rather than failing to
        /// deserialize the whole envelope.
        bpm: Value,
    },
    RequestMetronomeState {},
    /// Sent by the room's owner over their own session (not the approval
    /// channel) to admit a band-member applicant waiting in the pending map.
    ApprovePendingMember { user_id: UserId },
    /// Sent by the room's owner to drop a pending applicant without
    /// admitting them.
    RejectPendingMember { user_id: UserId },
}

/// Events the coordinator emits outward. `target` in the doc comments below
/// refers to where `bandroom-net` is expected to route the event: to the
/// originating caller, to a named channel, or globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// → caller
    RoomCreated { room: RoomSnapshot, user: Member },
    /// → global
    RoomCreatedBroadcast { room: RoomSummary },
    /// → caller
    RoomJoined {
        room: RoomSnapshot,
        users: Vec<Member>,
        pending_members: Vec<Member>,
    },
    /// → room channel, other subscribers
    UserJoined { user: Member },
    /// → room channel
    UserLeft { user: Member },
    /// → room channel
    RoomStateUpdated { room: RoomSnapshot },
    /// → room channel
    OwnershipTransferred { new_owner: Member, old_owner: Member },
    /// → room channel
    RoomClosed { message: String },
    /// → global
    RoomClosedBroadcast { room_id: RoomId },
    /// → caller
    RedirectToApproval {
        room_id: RoomId,
        message: String,
        approval_namespace: String,
    },
    /// → the rejected applicant, over the approval channel
    PendingRejected { message: String },
    /// → caller
    LeaveConfirmed { message: String },
    /// → room channel
    MetronomeTick { timestamp_ms: u64, bpm: u32 },
    /// → room channel
    MetronomeUpdated { bpm: u32, last_tick_timestamp_ms: u64 },
    /// → caller
    MetronomeState { bpm: u32, last_tick_timestamp_ms: u64 },
    /// → room channel
    RequestSynthParams { requester_id: UserId, target_user_id: UserId },
    /// → caller
    Error { message: String },
}

/// Channel path scheme: `"/room/<id>"`, `"/approval/<id>"`, and a single
/// process-wide `"/lobby-monitor"` for global fan-out.
pub fn room_channel_path(room_id: &RoomId) -> String {
    format!("/room/{}", room_id)
}

pub fn approval_channel_path(room_id: &RoomId) -> String {
    format!("/approval/{}", room_id)
}

pub const LOBBY_MONITOR_PATH: &str = "/lobby-monitor";
