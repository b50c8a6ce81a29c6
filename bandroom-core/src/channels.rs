//! Channel registry: per-path subscriber sets plus the connection table used
//! to reach them.
//!
//! Broadcasting never holds the registry lock during delivery: the set of
//! subscriber senders is cloned out from under the lock, then each is sent
//! to independently. A subscriber that has gone away (its receiver dropped)
//! just eats a failed send — best-effort fan-out, no acknowledgment.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use log::warn;

use bandroom_types::{approval_channel_path, room_channel_path, ConnId, CoreError, RoomId, ServerEvent};

#[derive(Default)]
pub struct ChannelRegistry {
    connections: Mutex<HashMap<ConnId, Sender<ServerEvent>>>,
    subscribers: Mutex<HashMap<String, HashSet<ConnId>>>,
    /// Test-only fault injection: when set, the next `get_or_create_*`
    /// reports failure once, then clears itself.
    fail_next_creation: AtomicBool,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_connection(&self, conn_id: ConnId, sender: Sender<ServerEvent>) {
        self.connections.lock().unwrap().insert(conn_id, sender);
    }

    /// Remove a connection and detach it from every channel it was
    /// subscribed to.
    pub fn unregister_connection(&self, conn_id: ConnId) {
        self.connections.lock().unwrap().remove(&conn_id);
        let mut subscribers = self.subscribers.lock().unwrap();
        for set in subscribers.values_mut() {
            set.remove(&conn_id);
        }
    }

    fn get_or_create(&self, path: &str) -> Result<(), CoreError> {
        if self.fail_next_creation.swap(false, Ordering::SeqCst) {
            warn!(target: "channels", "simulated channel-creation failure for {path}");
            return Err(CoreError::ChannelCreationFailed);
        }
        self.subscribers
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert_with(HashSet::new);
        Ok(())
    }

    pub fn get_or_create_room_channel(&self, room_id: &RoomId) -> Result<(), CoreError> {
        self.get_or_create(&room_channel_path(room_id))
    }

    pub fn get_or_create_approval_channel(&self, room_id: &RoomId) -> Result<(), CoreError> {
        self.get_or_create(&approval_channel_path(room_id))
    }

    pub fn destroy_room_channel(&self, room_id: &RoomId) {
        self.subscribers.lock().unwrap().remove(&room_channel_path(room_id));
    }

    pub fn destroy_approval_channel(&self, room_id: &RoomId) {
        self.subscribers
            .lock()
            .unwrap()
            .remove(&approval_channel_path(room_id));
    }

    pub fn subscribe(&self, path: &str, conn_id: ConnId) {
        self.subscribers
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert_with(HashSet::new)
            .insert(conn_id);
    }

    pub fn unsubscribe(&self, path: &str, conn_id: ConnId) {
        if let Some(set) = self.subscribers.lock().unwrap().get_mut(path) {
            set.remove(&conn_id);
        }
    }

    /// Best-effort fan-out to every subscriber of `path`, in the order they
    /// are iterated — no cross-subscriber ordering guarantee, but each
    /// subscriber's own sender delivers FIFO.
    pub fn broadcast(&self, path: &str, event: ServerEvent) {
        let senders: Vec<Sender<ServerEvent>> = {
            let subscribers = self.subscribers.lock().unwrap();
            let connections = self.connections.lock().unwrap();
            match subscribers.get(path) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| connections.get(id).cloned())
                    .collect(),
                None => Vec::new(),
            }
        };
        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }

    /// Like [`broadcast`](Self::broadcast), but skips `exclude` — used for
    /// `user_joined`, which must not echo back to the joiner even though
    /// they are already subscribed by the time it's emitted.
    pub fn broadcast_except(&self, path: &str, exclude: ConnId, event: ServerEvent) {
        let senders: Vec<Sender<ServerEvent>> = {
            let subscribers = self.subscribers.lock().unwrap();
            let connections = self.connections.lock().unwrap();
            match subscribers.get(path) {
                Some(ids) => ids
                    .iter()
                    .filter(|id| **id != exclude)
                    .filter_map(|id| connections.get(id).cloned())
                    .collect(),
                None => Vec::new(),
            }
        };
        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }

    /// Send directly to a single connection, bypassing subscription.
    pub fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
        let sender = self.connections.lock().unwrap().get(&conn_id).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    #[cfg(test)]
    pub fn inject_channel_creation_failure(&self) {
        self.fail_next_creation.store(true, Ordering::SeqCst);
    }
}
