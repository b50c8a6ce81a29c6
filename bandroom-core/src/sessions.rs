//! Session registry: connection → (room, user) bindings, plus the grace and
//! intentionally-left tables that back reconnection and re-approval.
//!
//! Expiry is lazy rather than thread-per-entry: the grace and
//! intentionally-left tables only ever get checked or swept by whoever holds
//! the registry, and the one thread that actually needs to *act* on a grace
//! expiry (to run the delayed ownership transfer) is owned by the
//! coordinator, not by this module — see `coordinator::run_grace_sweeper`.

use std::collections::HashMap;
use std::sync::Mutex;

use bandroom_types::{ConnId, Member, RoomId, UserId};

use crate::clock;

#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub room_id: RoomId,
    pub created_at_ms: u64,
}

struct GraceEntry {
    member: Member,
    expires_at_ms: u64,
}

struct LeftEntry {
    expires_at_ms: u64,
}

type RoomUser = (RoomId, UserId);

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnId, Session>>,
    by_room_user: Mutex<HashMap<RoomUser, ConnId>>,
    grace: Mutex<HashMap<RoomUser, GraceEntry>>,
    intentionally_left: Mutex<HashMap<RoomUser, LeftEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session, evicting any other live session for the same
    /// `(roomId, userId)` pair. Returns the evicted connection id, if any,
    /// so the caller can disconnect it.
    pub fn set_session(&self, room_id: RoomId, conn_id: ConnId, user_id: UserId) -> Option<ConnId> {
        let key = (room_id.clone(), user_id.clone());
        let stale = self.by_room_user.lock().unwrap().insert(key, conn_id);

        let session = Session {
            conn_id,
            user_id,
            room_id,
            created_at_ms: clock::wall_ms(),
        };
        self.sessions.lock().unwrap().insert(conn_id, session);

        stale.filter(|&old| old != conn_id)
    }

    pub fn get_session(&self, conn_id: ConnId) -> Option<Session> {
        self.sessions.lock().unwrap().get(&conn_id).cloned()
    }

    /// Reverse lookup: the live connection currently bound to `(roomId,
    /// userId)`, if any. Used to reach a pending applicant's connection from
    /// an owner's approve/reject decision, which only names the applicant's
    /// user id.
    pub fn session_for(&self, room_id: &RoomId, user_id: &UserId) -> Option<ConnId> {
        let key = (room_id.clone(), user_id.clone());
        self.by_room_user.lock().unwrap().get(&key).copied()
    }

    /// Remove a session. Also clears the `(room, user)` index entry, but
    /// only if it still points at this connection — a newer session for the
    /// same pair must not be clobbered by a late removal of a stale one.
    pub fn remove_session(&self, conn_id: ConnId) -> Option<Session> {
        let session = self.sessions.lock().unwrap().remove(&conn_id)?;
        let key = (session.room_id.clone(), session.user_id.clone());
        let mut by_room_user = self.by_room_user.lock().unwrap();
        if by_room_user.get(&key) == Some(&conn_id) {
            by_room_user.remove(&key);
        }
        Some(session)
    }

    pub fn put_grace(&self, room_id: RoomId, user_id: UserId, member: Member, ttl_ms: u64) {
        let key = (room_id, user_id);
        let entry = GraceEntry {
            member,
            expires_at_ms: clock::wall_ms() + ttl_ms,
        };
        self.grace.lock().unwrap().insert(key, entry);
    }

    pub fn is_in_grace(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        let key = (room_id.clone(), user_id.clone());
        let mut grace = self.grace.lock().unwrap();
        match grace.get(&key) {
            Some(entry) if entry.expires_at_ms > clock::wall_ms() => true,
            Some(_) => {
                grace.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Remove and return the grace snapshot for `(roomId, userId)`, unless it
    /// has already expired.
    pub fn pop_grace(&self, room_id: &RoomId, user_id: &UserId) -> Option<Member> {
        let key = (room_id.clone(), user_id.clone());
        let mut grace = self.grace.lock().unwrap();
        let entry = grace.remove(&key)?;
        if entry.expires_at_ms > clock::wall_ms() {
            Some(entry.member)
        } else {
            None
        }
    }

    /// Sweep and remove every grace entry whose TTL has elapsed, returning
    /// them for the caller to act on (run the delayed ownership transfer).
    pub fn take_expired_grace(&self) -> Vec<(RoomId, UserId, Member)> {
        let now = clock::wall_ms();
        let mut grace = self.grace.lock().unwrap();
        let expired_keys: Vec<RoomUser> = grace
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms <= now)
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| {
                grace
                    .remove(&key)
                    .map(|entry| (key.0, key.1, entry.member))
            })
            .collect()
    }

    pub fn mark_intentionally_left(&self, room_id: RoomId, user_id: UserId, ttl_ms: u64) {
        let key = (room_id, user_id);
        let entry = LeftEntry {
            expires_at_ms: clock::wall_ms() + ttl_ms,
        };
        self.intentionally_left.lock().unwrap().insert(key, entry);
    }

    pub fn has_intentionally_left(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        let key = (room_id.clone(), user_id.clone());
        let mut left = self.intentionally_left.lock().unwrap();
        match left.get(&key) {
            Some(entry) if entry.expires_at_ms > clock::wall_ms() => true,
            Some(_) => {
                left.remove(&key);
                false
            }
            None => false,
        }
    }

    pub fn clear_intentionally_left(&self, room_id: &RoomId, user_id: &UserId) {
        let key = (room_id.clone(), user_id.clone());
        self.intentionally_left.lock().unwrap().remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid() -> RoomId {
        RoomId::from("r1")
    }
    fn uid(s: &str) -> UserId {
        UserId::from(s)
    }

    #[test]
    fn set_session_evicts_sibling_for_same_room_and_user() {
        let registry = SessionRegistry::new();
        registry.set_session(rid(), ConnId::new(1), uid("u1"));
        let stale = registry.set_session(rid(), ConnId::new(2), uid("u1"));
        assert_eq!(stale, Some(ConnId::new(1)));
        assert!(registry.get_session(ConnId::new(1)).is_some());
    }

    #[test]
    fn session_for_resolves_room_user_to_connection() {
        let registry = SessionRegistry::new();
        registry.set_session(rid(), ConnId::new(7), uid("u1"));
        assert_eq!(registry.session_for(&rid(), &uid("u1")), Some(ConnId::new(7)));
        assert_eq!(registry.session_for(&rid(), &uid("ghost")), None);
    }

    #[test]
    fn remove_session_does_not_clobber_newer_index_entry() {
        let registry = SessionRegistry::new();
        registry.set_session(rid(), ConnId::new(1), uid("u1"));
        registry.set_session(rid(), ConnId::new(2), uid("u1"));
        registry.remove_session(ConnId::new(1));

        let stale = registry.set_session(rid(), ConnId::new(3), uid("u1"));
        assert_eq!(stale, Some(ConnId::new(2)));
    }

    #[test]
    fn grace_entry_expires_after_ttl() {
        let registry = SessionRegistry::new();
        let member = Member::new(uid("u1"), "alice".into(), bandroom_types::Role::Owner);
        registry.put_grace(rid(), uid("u1"), member, 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!registry.is_in_grace(&rid(), &uid("u1")));
    }

    #[test]
    fn pop_grace_returns_snapshot_within_ttl() {
        let registry = SessionRegistry::new();
        let member = Member::new(uid("u1"), "alice".into(), bandroom_types::Role::Owner);
        registry.put_grace(rid(), uid("u1"), member.clone(), 60_000);
        let popped = registry.pop_grace(&rid(), &uid("u1")).unwrap();
        assert_eq!(popped.user_id, member.user_id);
        assert!(!registry.is_in_grace(&rid(), &uid("u1")));
    }

    #[test]
    fn take_expired_grace_only_returns_elapsed_entries() {
        let registry = SessionRegistry::new();
        let member = Member::new(uid("u1"), "alice".into(), bandroom_types::Role::Owner);
        registry.put_grace(rid(), uid("u1"), member, 0);
        registry.put_grace(
            RoomId::from("other"),
            uid("u2"),
            Member::new(uid("u2"), "bob".into(), bandroom_types::Role::BandMember),
            60_000,
        );
        std::thread::sleep(std::time::Duration::from_millis(5));

        let expired = registry.take_expired_grace();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].1, uid("u1"));
    }

    #[test]
    fn intentionally_left_is_cleared_explicitly_or_by_expiry() {
        let registry = SessionRegistry::new();
        registry.mark_intentionally_left(rid(), uid("u4"), 60_000);
        assert!(registry.has_intentionally_left(&rid(), &uid("u4")));
        registry.clear_intentionally_left(&rid(), &uid("u4"));
        assert!(!registry.has_intentionally_left(&rid(), &uid("u4")));
    }
}
