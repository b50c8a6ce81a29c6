//! Event-stream transport adapter for the bandroom collaborative
//! music-room service.
//!
//! This crate is the "dumb pipe": it owns the TCP accept loop, the
//! length-prefixed JSON framing, and a reader/writer thread pair per
//! connection, and translates `ClientEvent`/`ServerEvent` wire values into
//! `bandroom_core::Coordinator` method calls and back. It carries none of
//! the core's invariants itself.

pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;

pub use client::RoomClient;
pub use server::RoomServer;
