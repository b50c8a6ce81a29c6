#![allow(dead_code)]
//! Shared harness for coordinator integration tests.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use bandroom_core::Coordinator;
use bandroom_types::{Config, ConnId, ServerEvent};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

pub fn fast_config() -> Config {
    Config {
        grace_period_ms: 80,
        intentionally_left_ttl_ms: 200,
        bpm_max: 3000,
        ..Config::default()
    }
}

/// A fake transport connection: a connection id plus the receiving half of
/// its outbound event channel.
pub struct TestClient {
    pub conn_id: ConnId,
    rx: Receiver<ServerEvent>,
}

impl TestClient {
    pub fn new(coordinator: &Coordinator, conn_id: u64) -> Self {
        let conn_id = ConnId::new(conn_id);
        let (tx, rx) = std::sync::mpsc::channel();
        coordinator.register_connection(conn_id, tx);
        Self { conn_id, rx }
    }

    /// Wait for the next event addressed to this connection.
    pub fn expect(&self, timeout: Duration) -> ServerEvent {
        self.rx
            .recv_timeout(timeout)
            .unwrap_or_else(|e| panic!("conn {:?}: expected an event, got {e}", self.conn_id))
    }

    /// Wait for an event matching `pred`, skipping any others (used when a
    /// connection is also subscribed to high-frequency channels like
    /// metronome ticks and we only care about one event kind).
    pub fn expect_matching(
        &self,
        timeout: Duration,
        pred: impl Fn(&ServerEvent) -> bool,
    ) -> ServerEvent {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                panic!("conn {:?}: timed out waiting for matching event", self.conn_id);
            }
            match self.rx.recv_timeout(remaining) {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("conn {:?}: {e}", self.conn_id),
            }
        }
    }

    pub fn expect_none(&self, wait: Duration) {
        match self.rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(event) => panic!("conn {:?}: expected no event, got {event:?}", self.conn_id),
            Err(e) => panic!("conn {:?}: {e}", self.conn_id),
        }
    }
}
