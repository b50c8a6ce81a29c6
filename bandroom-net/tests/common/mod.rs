#![allow(dead_code)]
//! Shared harness for bandroom-net's socket-level integration tests.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bandroom_net::server::RoomServer;
use bandroom_net::RoomClient;
use bandroom_types::Config;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Shortened grace/intentionally-left windows so reconnection tests don't
/// need to sleep for the production defaults.
pub fn fast_config() -> Config {
    Config {
        grace_period_ms: 150,
        intentionally_left_ttl_ms: 300,
        ..Config::default()
    }
}

/// Bind a server on an ephemeral port and start serving in the background.
/// Returns the server (to allow inspecting its `Coordinator` directly) and
/// the address new clients should connect to.
pub fn spawn_server(config: Config) -> (Arc<RoomServer>, String) {
    let server = Arc::new(RoomServer::bind("127.0.0.1:0", config).expect("bind"));
    let addr = server.local_addr().expect("local_addr").to_string();
    let driver = server.clone();
    thread::spawn(move || {
        let _ = driver.run();
    });
    (server, addr)
}

pub fn connect(addr: &str) -> RoomClient {
    RoomClient::connect(addr).expect("connect")
}
