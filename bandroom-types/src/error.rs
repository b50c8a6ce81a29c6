//! Failure kinds the room store and channel registry can report.
//!
//! Most of these are turned into silent no-ops by the coordinator — they
//! exist as typed values so a caller that *does* care (tests, telemetry)
//! can distinguish them, not because every caller is expected to propagate
//! them.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    RoomNotFound,
    NotPending,
    InvalidBpm,
    NotAnOwner,
    ChannelCreationFailed,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::RoomNotFound => write!(f, "room not found"),
            CoreError::NotPending => write!(f, "user is not pending"),
            CoreError::InvalidBpm => write!(f, "bpm is missing or out of range"),
            CoreError::NotAnOwner => write!(f, "target is not an existing non-owner member"),
            CoreError::ChannelCreationFailed => write!(f, "failed to create broadcast channel"),
        }
    }
}

impl std::error::Error for CoreError {}
