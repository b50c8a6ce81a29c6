//! Lifecycle coordinator: the public surface the transport layer calls into.
//!
//! Translates inbound events into ordered mutations across the room store,
//! session registry, channel registry, and metronome engine, and emits the
//! resulting outbound events. This is the composition root: it owns the
//! other four components and hands out `Arc` clones to the background grace
//! sweeper, never the other way around.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::warn;
use serde_json::Value;

use bandroom_types::{
    approval_channel_path, room_channel_path, Config, ConnId, Member, Role, RoomId, RoomSummary,
    ServerEvent, UserId, LOBBY_MONITOR_PATH,
};

use crate::channels::ChannelRegistry;
use crate::metronome::MetronomeEngine;
use crate::room_store::RoomStore;
use crate::sessions::SessionRegistry;

/// How often the background thread checks for expired grace entries.
const GRACE_SWEEP_INTERVAL: Duration = Duration::from_millis(250);

pub struct Coordinator {
    config: Config,
    room_store: Arc<RoomStore>,
    sessions: Arc<SessionRegistry>,
    channels: Arc<ChannelRegistry>,
    metronome: Arc<MetronomeEngine>,
    sweeper_stop: Option<mpsc::Sender<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        let room_store = Arc::new(RoomStore::new(config));
        let sessions = Arc::new(SessionRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let metronome = Arc::new(MetronomeEngine::new(room_store.clone(), channels.clone()));

        let (sweeper_stop, stop_rx) = mpsc::channel();
        let sweep_room_store = room_store.clone();
        let sweep_sessions = sessions.clone();
        let sweep_channels = channels.clone();
        let sweep_metronome = metronome.clone();
        let sweeper = thread::spawn(move || {
            run_grace_sweeper(sweep_room_store, sweep_sessions, sweep_channels, sweep_metronome, stop_rx);
        });

        Self {
            config,
            room_store,
            sessions,
            channels,
            metronome,
            sweeper_stop: Some(sweeper_stop),
            sweeper: Some(sweeper),
        }
    }

    /// Register a transport connection's outbound sender so the coordinator
    /// can address events to it. Must be called before any event arrives on
    /// `conn_id`.
    pub fn register_connection(&self, conn_id: ConnId, sender: mpsc::Sender<ServerEvent>) {
        self.channels.register_connection(conn_id, sender);
    }

    pub fn create_room(
        &self,
        conn_id: ConnId,
        name: String,
        username: String,
        user_id: UserId,
        is_private: bool,
        is_hidden: bool,
    ) {
        if self.sessions.get_session(conn_id).is_some() {
            return;
        }

        let (room, owner) =
            self.room_store
                .create_room(name, username, user_id.clone(), is_private, is_hidden);
        self.sessions.set_session(room.id.clone(), conn_id, user_id);

        let path = room_channel_path(&room.id);
        if let Err(e) = self.channels.get_or_create_room_channel(&room.id) {
            warn!(target: "coordinator", "room channel creation failed for {}: {e}", room.id);
        }
        self.channels.subscribe(&path, conn_id);

        if is_private {
            if let Err(e) = self.channels.get_or_create_approval_channel(&room.id) {
                warn!(target: "coordinator", "approval channel creation failed for {}: {e}", room.id);
            }
        }

        self.metronome.initialize(room.id.clone(), room.metronome.bpm);

        self.channels.send_to(
            conn_id,
            ServerEvent::RoomCreated {
                room: room.clone(),
                user: owner,
            },
        );
        self.channels.broadcast(
            LOBBY_MONITOR_PATH,
            ServerEvent::RoomCreatedBroadcast {
                room: RoomSummary::from(&room),
            },
        );
    }

    /// Returns the stale connection id that was just evicted (a prior
    /// session for the same user in the same room), if any — the caller is
    /// expected to close that connection.
    pub fn join_room(
        &self,
        conn_id: ConnId,
        room_id: RoomId,
        username: String,
        user_id: UserId,
        role: Role,
    ) -> Option<ConnId> {
        let Some(room) = self.room_store.get_room(&room_id) else {
            self.channels.send_to(
                conn_id,
                ServerEvent::Error {
                    message: "Room not found".into(),
                },
            );
            return None;
        };

        let member = if let Some(existing) = room.member(&user_id) {
            // Already a member: page refresh. Any leftover grace entry is moot.
            self.sessions.pop_grace(&room_id, &user_id);
            existing.clone()
        } else if let Some(restored) = self.sessions.pop_grace(&room_id, &user_id) {
            let restored = restored.with_display_name(username.clone());
            if self.room_store.add_member(&room_id, restored.clone()).is_err() {
                return None;
            }
            restored
        } else if room.is_private && matches!(role, Role::BandMember) {
            // Covers both the intentionally-left retry and a first-time
            // band-member request against a private room — same redirect.
            self.sessions.clear_intentionally_left(&room_id, &user_id);

            let pending_member = Member::new(user_id.clone(), username.clone(), role);
            if self.room_store.add_pending(&room_id, pending_member).is_err() {
                return None;
            }

            let approval_path = approval_channel_path(&room_id);
            if let Err(e) = self.channels.get_or_create_approval_channel(&room_id) {
                warn!(target: "coordinator", "approval channel creation failed for {}: {e}", room_id);
            }
            // Reuses the session table so the owner's later approve/reject
            // decision can find this connection via `session_for` — the
            // applicant isn't a member yet, but they are a live connection
            // tied to this (room, user).
            let evicted = self.sessions.set_session(room_id.clone(), conn_id, user_id.clone());
            self.channels.subscribe(&approval_path, conn_id);
            if let Some(stale) = evicted {
                self.channels.unsubscribe(&approval_path, stale);
                self.channels.unregister_connection(stale);
                self.sessions.remove_session(stale);
            }

            self.channels.send_to(
                conn_id,
                ServerEvent::RedirectToApproval {
                    room_id: room_id.clone(),
                    message: "This room requires owner approval to join".into(),
                    approval_namespace: approval_path,
                },
            );
            if let Some(updated_room) = self.room_store.get_room(&room_id) {
                self.channels.broadcast(
                    &room_channel_path(&room_id),
                    ServerEvent::RoomStateUpdated { room: updated_room },
                );
            }
            return None;
        } else {
            if self.room_store.is_full(&room_id) {
                self.channels.send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: "Room is full".into(),
                    },
                );
                return None;
            }
            let fresh = Member::new(user_id.clone(), username.clone(), role);
            if self.room_store.add_member(&room_id, fresh.clone()).is_err() {
                return None;
            }
            fresh
        };

        let evicted = self.sessions.set_session(room_id.clone(), conn_id, user_id.clone());
        let path = room_channel_path(&room_id);
        self.channels.subscribe(&path, conn_id);

        if let Some(stale) = evicted {
            self.channels.unsubscribe(&path, stale);
            self.channels.unregister_connection(stale);
            self.sessions.remove_session(stale);
        }

        let Some(room) = self.room_store.get_room(&room_id) else {
            return evicted;
        };

        // Ordering pinned per the coordinator's delivery-order contract:
        // caller sees room_joined before the room channel sees user_joined.
        self.channels.send_to(
            conn_id,
            ServerEvent::RoomJoined {
                room: room.clone(),
                users: room.users.clone(),
                pending_members: room.pending_members.clone(),
            },
        );
        self.channels
            .broadcast_except(&path, conn_id, ServerEvent::UserJoined { user: member.clone() });
        self.channels
            .broadcast(&path, ServerEvent::RoomStateUpdated { room: room.clone() });

        for other in &room.users {
            if other.user_id != member.user_id && other.current_category.as_deref() == Some("synth") {
                self.channels.broadcast(
                    &path,
                    ServerEvent::RequestSynthParams {
                        requester_id: member.user_id.clone(),
                        target_user_id: other.user_id.clone(),
                    },
                );
            }
        }

        evicted
    }

    pub fn leave_room(&self, conn_id: ConnId, intentional: bool) {
        let Some(session) = self.sessions.get_session(conn_id) else {
            return;
        };
        let room_id = session.room_id.clone();
        let user_id = session.user_id.clone();
        let path = room_channel_path(&room_id);

        if self.room_store.is_pending(&room_id, &user_id) {
            if self.room_store.reject_pending(&room_id, &user_id).is_ok() {
                if let Some(room) = self.room_store.get_room(&room_id) {
                    self.channels.broadcast(&path, ServerEvent::RoomStateUpdated { room });
                }
            }
            self.channels.unsubscribe(&approval_channel_path(&room_id), conn_id);
            self.sessions.remove_session(conn_id);
            return;
        }

        let Some(room) = self.room_store.get_room(&room_id) else {
            return;
        };
        let Some(member) = room.member(&user_id).cloned() else {
            return;
        };

        self.channels.send_to(
            conn_id,
            ServerEvent::LeaveConfirmed {
                message: "You have left the room".into(),
            },
        );

        // Grace-entry recording must happen before the member is removed so
        // a racing reconnect can observe it immediately.
        if !intentional {
            self.sessions
                .put_grace(room_id.clone(), user_id.clone(), member.clone(), self.config.grace_period_ms);
        }

        let removed = self.room_store.remove_member(&room_id, &user_id);
        if intentional {
            self.sessions
                .mark_intentionally_left(room_id.clone(), user_id.clone(), self.config.intentionally_left_ttl_ms);
        }

        if let Some(removed) = removed {
            let was_owner = member.role == Role::Owner;
            if was_owner {
                if removed.should_close {
                    if intentional {
                        close_room(&self.room_store, &self.channels, &self.metronome, &room_id);
                    }
                    // Unintentional + should_close: the room survives empty
                    // until grace expires (see run_grace_sweeper).
                } else if intentional {
                    run_ownership_transfer_or_close(&self.room_store, &self.channels, &self.metronome, &room_id);
                }
                // Unintentional, not should_close: ownership transfer is
                // deferred to the grace sweeper so a reconnect can cancel it.
            } else if removed.should_close {
                close_room(&self.room_store, &self.channels, &self.metronome, &room_id);
            } else {
                self.channels
                    .broadcast(&path, ServerEvent::UserLeft { user: removed.member });
                if let Some(room) = self.room_store.get_room(&room_id) {
                    self.channels.broadcast(&path, ServerEvent::RoomStateUpdated { room });
                }
            }
        }

        self.channels.unsubscribe(&path, conn_id);
        self.sessions.remove_session(conn_id);
    }

    pub fn update_metronome(&self, conn_id: ConnId, bpm: Value) {
        self.update_metronome_inner(conn_id, bpm, None);
    }

    /// Namespace-scoped variant: broadcasts on `channel_path` instead of
    /// resolving the room's channel from the registry. Behaviorally
    /// identical otherwise.
    pub fn update_metronome_on(&self, conn_id: ConnId, bpm: Value, channel_path: &str) {
        self.update_metronome_inner(conn_id, bpm, Some(channel_path));
    }

    fn update_metronome_inner(&self, conn_id: ConnId, bpm: Value, channel_path: Option<&str>) {
        let Some(session) = self.sessions.get_session(conn_id) else {
            return;
        };
        let Some(room) = self.room_store.get_room(&session.room_id) else {
            return;
        };
        let Some(member) = room.member(&session.user_id) else {
            return;
        };
        if !member.role.can_change_tempo() {
            return;
        }

        let updated = match self.room_store.update_metronome_bpm(&session.room_id, &bpm) {
            Ok(room) => room,
            Err(_) => return,
        };

        self.metronome.update_tempo(&session.room_id, updated.metronome.bpm);

        let path = channel_path
            .map(str::to_string)
            .unwrap_or_else(|| room_channel_path(&session.room_id));
        match self.channels.get_or_create_room_channel(&session.room_id) {
            Ok(()) => {
                self.channels.broadcast(
                    &path,
                    ServerEvent::MetronomeUpdated {
                        bpm: updated.metronome.bpm,
                        last_tick_timestamp_ms: updated.metronome.last_tick_timestamp_ms,
                    },
                );
            }
            Err(e) => warn!(
                target: "coordinator",
                "channel creation failed for {}: {e}; tempo update still applied",
                session.room_id
            ),
        }
    }

    pub fn request_metronome_state(&self, conn_id: ConnId) {
        self.request_metronome_state_inner(conn_id, None);
    }

    /// Namespace-scoped variant: identical to [`request_metronome_state`],
    /// except the caller supplies `channel_path` instead of the coordinator
    /// resolving the room's channel from the registry. The reply still goes
    /// directly to `conn_id` — `request_metronome_state` never broadcasts —
    /// so `channel_path` only matters if a future transport wants to address
    /// this caller via a channel instead of its raw connection id.
    ///
    /// [`request_metronome_state`]: Self::request_metronome_state
    pub fn request_metronome_state_on(&self, conn_id: ConnId, channel_path: &str) {
        self.request_metronome_state_inner(conn_id, Some(channel_path));
    }

    fn request_metronome_state_inner(&self, conn_id: ConnId, _channel_path: Option<&str>) {
        let Some(session) = self.sessions.get_session(conn_id) else {
            return;
        };
        let Some(state) = self.room_store.get_metronome_state(&session.room_id) else {
            return;
        };
        self.channels.send_to(
            conn_id,
            ServerEvent::MetronomeState {
                bpm: state.bpm,
                last_tick_timestamp_ms: state.last_tick_timestamp_ms,
            },
        );
    }

    /// Owner admits a pending band-member applicant: moves them from the
    /// pending map into membership and, if their connection is still
    /// attached to the approval channel, completes the join the same way an
    /// accepted `join_room` would — `room_joined` to the applicant,
    /// `user_joined` to everyone else, `room_state_updated` to all.
    pub fn approve_pending_member(&self, conn_id: ConnId, user_id: UserId) {
        let Some(session) = self.sessions.get_session(conn_id) else {
            return;
        };
        let room_id = session.room_id.clone();
        let Some(room) = self.room_store.get_room(&room_id) else {
            return;
        };
        if room.owner != session.user_id {
            return;
        }
        let Ok(member) = self.room_store.approve_pending(&room_id, &user_id) else {
            return;
        };

        let room_path = room_channel_path(&room_id);
        let approval_path = approval_channel_path(&room_id);

        if let Some(applicant_conn) = self.sessions.session_for(&room_id, &user_id) {
            self.channels.unsubscribe(&approval_path, applicant_conn);
            self.channels.subscribe(&room_path, applicant_conn);
            if let Some(fresh_room) = self.room_store.get_room(&room_id) {
                self.channels.send_to(
                    applicant_conn,
                    ServerEvent::RoomJoined {
                        room: fresh_room.clone(),
                        users: fresh_room.users.clone(),
                        pending_members: fresh_room.pending_members.clone(),
                    },
                );
            }
            self.channels
                .broadcast_except(&room_path, applicant_conn, ServerEvent::UserJoined { user: member });
        } else {
            self.channels.broadcast(&room_path, ServerEvent::UserJoined { user: member });
        }

        if let Some(fresh_room) = self.room_store.get_room(&room_id) {
            self.channels.broadcast(&room_path, ServerEvent::RoomStateUpdated { room: fresh_room });
        }
    }

    /// Owner drops a pending applicant without admitting them. The
    /// applicant's connection, if still attached, is told and unsubscribed
    /// from the approval channel.
    pub fn reject_pending_member(&self, conn_id: ConnId, user_id: UserId) {
        let Some(session) = self.sessions.get_session(conn_id) else {
            return;
        };
        let room_id = session.room_id.clone();
        let Some(room) = self.room_store.get_room(&room_id) else {
            return;
        };
        if room.owner != session.user_id {
            return;
        }
        if self.room_store.reject_pending(&room_id, &user_id).is_err() {
            return;
        }

        let approval_path = approval_channel_path(&room_id);
        if let Some(applicant_conn) = self.sessions.session_for(&room_id, &user_id) {
            self.channels.send_to(
                applicant_conn,
                ServerEvent::PendingRejected {
                    message: "Your request to join was rejected".into(),
                },
            );
            self.channels.unsubscribe(&approval_path, applicant_conn);
            self.sessions.remove_session(applicant_conn);
        }

        if let Some(fresh_room) = self.room_store.get_room(&room_id) {
            self.channels
                .broadcast(&room_channel_path(&room_id), ServerEvent::RoomStateUpdated { room: fresh_room });
        }
    }

    /// Called once by the transport when a connection's socket has actually
    /// gone away (not on an explicit `leave_room` event, which may be
    /// followed by the same connection joining another room). Runs the
    /// unintentional-leave path, then drops the connection's sender and any
    /// leftover channel subscriptions — unlike `leave_room`, there is no
    /// socket left to address further events to.
    pub fn handle_connection_loss(&self, conn_id: ConnId) {
        self.leave_room(conn_id, false);
        self.channels.unregister_connection(conn_id);
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(stop) = self.sweeper_stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }
}

fn close_room(room_store: &RoomStore, channels: &ChannelRegistry, metronome: &MetronomeEngine, room_id: &RoomId) {
    let path = room_channel_path(room_id);
    channels.broadcast(
        &path,
        ServerEvent::RoomClosed {
            message: "Room is empty and has been closed".into(),
        },
    );
    metronome.cleanup(room_id);
    channels.destroy_room_channel(room_id);
    channels.destroy_approval_channel(room_id);
    room_store.delete_room(room_id);
    channels.broadcast(
        LOBBY_MONITOR_PATH,
        ServerEvent::RoomClosedBroadcast { room_id: room_id.clone() },
    );
}

fn run_ownership_transfer_or_close(
    room_store: &RoomStore,
    channels: &ChannelRegistry,
    metronome: &MetronomeEngine,
    room_id: &RoomId,
) {
    if room_store.should_close(room_id) {
        close_room(room_store, channels, metronome, room_id);
        return;
    }
    let Some(candidate) = room_store.any_member(room_id) else {
        return;
    };
    if let Ok((new_owner, old_owner)) = room_store.transfer_ownership(room_id, &candidate.user_id) {
        let path = room_channel_path(room_id);
        channels.broadcast(&path, ServerEvent::OwnershipTransferred { new_owner, old_owner });
        if let Some(room) = room_store.get_room(room_id) {
            channels.broadcast(&path, ServerEvent::RoomStateUpdated { room });
        }
    }
}


fn run_grace_sweeper(
    room_store: Arc<RoomStore>,
    sessions: Arc<SessionRegistry>,
    channels: Arc<ChannelRegistry>,
    metronome: Arc<MetronomeEngine>,
    stop_rx: mpsc::Receiver<()>,
) {
    loop {
        match stop_rx.recv_timeout(GRACE_SWEEP_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        for (room_id, _user_id, member) in sessions.take_expired_grace() {
            // Only an expired owner grace entry has ownership consequences;
            // a regular member's lapsed grace needs no further action.
            if member.role != Role::Owner {
                continue;
            }
            run_ownership_transfer_or_close(&room_store, &channels, &metronome, &room_id);
        }
    }
}
