//! Wire-level constants for bandroom's event-stream protocol.
//!
//! The message types themselves — `ClientEvent` and `ServerEvent` — are not
//! redefined here: they live in `bandroom_types::events` so the core and
//! the transport agree on exactly one definition. This module only holds
//! the bits that are specific to carrying those values over a TCP socket.

use std::time::Duration;

pub use bandroom_types::{ClientEvent, ServerEvent};

/// How long a write to a slow client may block before the connection is
/// considered dead. Keeps one stalled reader from starving the writer
/// thread of every other connection (each connection has its own writer
/// thread, but an unbounded write can still wedge a socket indefinitely).
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames above this size are rejected by `framing::read_message` before any
/// allocation — a malformed length prefix must not be used to trigger an
/// unbounded allocation.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_timeout_is_positive() {
        assert!(WRITE_TIMEOUT > Duration::ZERO);
    }
}
