//! TCP accept loop and per-connection reader/writer threads.
//!
//! Each connection gets a reader thread (blocking reads, one `ClientEvent`
//! at a time, dispatched straight into the `Coordinator`) and a writer
//! thread (drains the connection's outbound `mpsc::Receiver<ServerEvent>`
//! and frames each event onto the socket). A plain blocking accept loop
//! spawns an independent thread pair per connection rather than a central
//! poll loop, since the coordinator is already internally thread-safe per
//! room and there is no shared tick to integrate with.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use log::{info, warn};

use bandroom_core::Coordinator;
use bandroom_types::{Config, ConnId};

use crate::framing::{read_message, write_message};
use crate::protocol::{ClientEvent, WRITE_TIMEOUT};

type SocketTable = Mutex<HashMap<ConnId, TcpStream>>;

/// Accepts TCP connections and drives a [`Coordinator`] from them.
pub struct RoomServer {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    next_conn_id: AtomicU64,
    /// Kept so a stale connection evicted by `join_room` can be force-closed
    /// — shutting down its socket is what unblocks that connection's reader
    /// thread so it notices the eviction and tears itself down.
    sockets: Arc<SocketTable>,
}

impl RoomServer {
    pub fn bind(addr: &str, config: Config) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(target: "server", "bandroom-net listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            coordinator: Arc::new(Coordinator::new(config)),
            next_conn_id: AtomicU64::new(1),
            sockets: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The coordinator this server drives, shared so a caller (e.g. a test
    /// or an embedding binary) can inspect room state directly.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Accept connections forever, spawning a reader/writer thread pair for
    /// each. Returns only on a fatal accept error; a malformed client never
    /// takes down the listener.
    pub fn run(&self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            self.accept(stream, peer);
        }
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        let conn_id = ConnId::new(self.next_conn_id.fetch_add(1, Ordering::SeqCst));
        info!(target: "server", "{} connected from {}", conn_id, peer);

        let read_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "server", "{} failed to clone socket: {}", conn_id, e);
                return;
            }
        };
        let write_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "server", "{} failed to clone socket: {}", conn_id, e);
                return;
            }
        };
        if let Err(e) = write_stream.set_write_timeout(Some(WRITE_TIMEOUT)) {
            warn!(target: "server", "{} failed to set write timeout: {}", conn_id, e);
        }
        self.sockets.lock().unwrap().insert(conn_id, stream);

        let (tx, rx) = mpsc::channel();
        self.coordinator.register_connection(conn_id, tx);

        thread::spawn(move || writer_thread(conn_id, write_stream, rx));

        let coordinator = self.coordinator.clone();
        let sockets = self.sockets.clone();
        thread::spawn(move || reader_thread(conn_id, read_stream, coordinator, sockets));
    }
}

/// Drains events addressed to one connection and frames them onto its
/// socket. Exits once the channel closes (the coordinator drops its sender
/// when the connection is unregistered) or a write fails.
fn writer_thread(conn_id: ConnId, stream: TcpStream, rx: mpsc::Receiver<bandroom_types::ServerEvent>) {
    let mut writer = BufWriter::new(stream);
    while let Ok(event) = rx.recv() {
        if let Err(e) = write_message(&mut writer, &event) {
            warn!(target: "server", "{} write error: {}", conn_id, e);
            break;
        }
    }
    info!(target: "server", "{} writer thread exiting", conn_id);
}

/// Reads framed `ClientEvent`s until the socket errors or closes, dispatching
/// each one into the coordinator. Runs the connection-loss path on exit.
fn reader_thread(conn_id: ConnId, stream: TcpStream, coordinator: Arc<Coordinator>, sockets: Arc<SocketTable>) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_message::<_, ClientEvent>(&mut reader) {
            Ok(event) => dispatch(conn_id, event, &coordinator, &sockets),
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    warn!(target: "server", "{} read error: {}", conn_id, e);
                }
                break;
            }
        }
    }

    coordinator.handle_connection_loss(conn_id);
    sockets.lock().unwrap().remove(&conn_id);
    info!(target: "server", "{} reader thread exiting", conn_id);
}

fn dispatch(conn_id: ConnId, event: ClientEvent, coordinator: &Coordinator, sockets: &SocketTable) {
    match event {
        ClientEvent::CreateRoom {
            name,
            username,
            user_id,
            is_private,
            is_hidden,
        } => {
            coordinator.create_room(conn_id, name, username, user_id, is_private, is_hidden);
        }
        ClientEvent::JoinRoom {
            room_id,
            username,
            user_id,
            role,
        } => {
            if let Some(stale) = coordinator.join_room(conn_id, room_id, username, user_id, role) {
                shutdown_connection(sockets, stale);
            }
        }
        ClientEvent::LeaveRoom {} => coordinator.leave_room(conn_id, true),
        ClientEvent::UpdateMetronome { bpm } => coordinator.update_metronome(conn_id, bpm),
        ClientEvent::RequestMetronomeState {} => coordinator.request_metronome_state(conn_id),
        ClientEvent::ApprovePendingMember { user_id } => coordinator.approve_pending_member(conn_id, user_id),
        ClientEvent::RejectPendingMember { user_id } => coordinator.reject_pending_member(conn_id, user_id),
    }
}

/// Force-close a connection's socket so its reader thread unblocks and tears
/// itself down. Used when `join_room` reports a stale sibling session for
/// the same user — the coordinator has already evicted it from room state,
/// this just makes the transport catch up.
fn shutdown_connection(sockets: &SocketTable, conn_id: ConnId) {
    if let Some(stream) = sockets.lock().unwrap().get(&conn_id) {
        let _ = stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RoomClient;
    use bandroom_types::{Role, ServerEvent};
    use std::time::Duration;

    fn spawn_server() -> (Arc<RoomServer>, String) {
        let server = Arc::new(RoomServer::bind("127.0.0.1:0", Config::default()).unwrap());
        let addr = server.local_addr().unwrap().to_string();
        let run_handle = server.clone();
        thread::spawn(move || {
            let _ = run_handle.run();
        });
        (server, addr)
    }

    #[test]
    fn create_room_round_trips_over_tcp() {
        let (_server, addr) = spawn_server();
        let mut client = RoomClient::connect(&addr).unwrap();
        client
            .send(ClientEvent::CreateRoom {
                name: "Jam".into(),
                username: "alice".into(),
                user_id: "u1".into(),
                is_private: false,
                is_hidden: false,
            })
            .unwrap();

        match client.recv(Duration::from_secs(1)) {
            Some(ServerEvent::RoomCreated { room, user }) => {
                assert_eq!(room.owner.as_str(), "u1");
                assert_eq!(user.role, bandroom_types::Role::Owner);
            }
            other => panic!("expected RoomCreated, got {:?}", other),
        }
    }

    #[test]
    fn stale_session_is_disconnected_on_rejoin() {
        let (_server, addr) = spawn_server();
        let mut first = RoomClient::connect(&addr).unwrap();
        first
            .send(ClientEvent::CreateRoom {
                name: "Jam".into(),
                username: "alice".into(),
                user_id: "u1".into(),
                is_private: false,
                is_hidden: false,
            })
            .unwrap();
        let room_id = match first.recv(Duration::from_secs(1)) {
            Some(ServerEvent::RoomCreated { room, .. }) => room.id,
            other => panic!("expected RoomCreated, got {:?}", other),
        };

        let mut second = RoomClient::connect(&addr).unwrap();
        second
            .send(ClientEvent::JoinRoom {
                room_id,
                username: "alice-2".into(),
                user_id: "u1".into(),
                role: Role::BandMember,
            })
            .unwrap();

        // The first connection's socket is force-closed once the second
        // session evicts it; its reader thread should observe EOF.
        assert!(
            first.recv(Duration::from_secs(1)).is_none(),
            "stale connection should receive no further events"
        );
    }
}
