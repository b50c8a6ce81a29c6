//! Room-lifecycle coordinator and per-room metronome scheduler for the
//! bandroom collaborative music-room service.
//!
//! This crate is the hard core: in-memory room store, session/grace
//! registry, broadcast-channel registry, drift-corrected tick scheduler,
//! and the coordinator that wires them together. The wire transport,
//! persistence, and authentication live elsewhere.

pub mod channels;
pub mod clock;
pub mod coordinator;
pub mod metronome;
pub mod room_store;
pub mod sessions;

pub use channels::ChannelRegistry;
pub use coordinator::Coordinator;
pub use metronome::{DriftStats, MetronomeEngine};
pub use room_store::{Removed, RoomStore};
pub use sessions::{Session, SessionRegistry};
