//! # bandroom-types
//!
//! Shared type definitions for the bandroom collaborative music-room
//! service: identifiers, the membership/room data model, the event
//! envelopes exchanged with the transport layer, and process-wide
//! configuration.

pub mod config;
mod error;
mod events;
mod ids;
mod member;
mod room;

pub use config::Config;
pub use error::CoreError;
pub use events::{
    approval_channel_path, room_channel_path, ClientEvent, ServerEvent, LOBBY_MONITOR_PATH,
};
pub use ids::{ConnId, RoomId, UserId};
pub use member::{Member, Role};
pub use room::{MetronomeConfig, RoomSnapshot, RoomSummary};
