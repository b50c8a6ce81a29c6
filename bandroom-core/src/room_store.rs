//! In-memory room store.
//!
//! Every mutation below is atomic with respect to a single room: the outer
//! map is only locked long enough to find (or insert) the room's own mutex,
//! which is then held for the duration of the operation. Two operations on
//! different rooms never block each other; two operations on the same room
//! never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bandroom_types::{Config, CoreError, Member, MetronomeConfig, Role, RoomId, RoomSnapshot, UserId};

use crate::clock;

struct RoomEntry {
    name: String,
    owner: UserId,
    /// Join order of current members, oldest first. Drives the deterministic
    /// `any_member` selection rule used for ownership transfer.
    member_order: Vec<UserId>,
    members: HashMap<UserId, Member>,
    pending_order: Vec<UserId>,
    pending: HashMap<UserId, Member>,
    is_private: bool,
    is_hidden: bool,
    created_at_ms: u64,
    metronome: MetronomeConfig,
}

impl RoomEntry {
    fn snapshot(&self, id: &RoomId) -> RoomSnapshot {
        RoomSnapshot {
            id: id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            users: self
                .member_order
                .iter()
                .filter_map(|u| self.members.get(u).cloned())
                .collect(),
            pending_members: self
                .pending_order
                .iter()
                .filter_map(|u| self.pending.get(u).cloned())
                .collect(),
            is_private: self.is_private,
            is_hidden: self.is_hidden,
            created_at_ms: self.created_at_ms,
            metronome: self.metronome,
        }
    }

    fn remove_from_order(order: &mut Vec<UserId>, user_id: &UserId) {
        if let Some(pos) = order.iter().position(|u| u == user_id) {
            order.remove(pos);
        }
    }
}

/// Outcome of [`RoomStore::remove_member`].
pub struct Removed {
    pub member: Member,
    /// True once this removal leaves the room with no members (pending
    /// members don't count — see [`RoomStore::should_close`]).
    pub should_close: bool,
}

pub struct RoomStore {
    config: Config,
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<RoomEntry>>>>,
}

impl RoomStore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, room_id: &RoomId) -> Option<Arc<Mutex<RoomEntry>>> {
        self.rooms.read().unwrap().get(room_id).cloned()
    }

    /// Allocate a room id and install the creator as owner. Idempotence (not
    /// creating duplicate rooms for a retried request) is the caller's
    /// responsibility — this always creates a new room.
    pub fn create_room(
        &self,
        name: String,
        username: String,
        user_id: UserId,
        is_private: bool,
        is_hidden: bool,
    ) -> (RoomSnapshot, Member) {
        let id = RoomId::generate();
        let owner = Member::new(user_id.clone(), username, Role::Owner);

        let mut members = HashMap::new();
        members.insert(user_id.clone(), owner.clone());

        let now = clock::wall_ms();
        let entry = RoomEntry {
            name,
            owner: user_id.clone(),
            member_order: vec![user_id],
            members,
            pending_order: Vec::new(),
            pending: HashMap::new(),
            is_private,
            is_hidden,
            created_at_ms: now,
            metronome: MetronomeConfig::new(self.config.bpm_default, now),
        };
        let snapshot = entry.snapshot(&id);

        self.rooms
            .write()
            .unwrap()
            .insert(id, Arc::new(Mutex::new(entry)));

        (snapshot, owner)
    }

    pub fn get_room(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let entry = self.entry(room_id)?;
        let entry = entry.lock().unwrap();
        Some(entry.snapshot(room_id))
    }

    /// Hard cap on concurrent members, independent of role. Pending members
    /// don't count toward it.
    pub fn is_full(&self, room_id: &RoomId) -> bool {
        match self.entry(room_id) {
            Some(entry) => entry.lock().unwrap().members.len() >= self.config.max_participants,
            None => false,
        }
    }

    /// Insert unless a member with that id already exists, in which case
    /// this is a no-op success (idempotent join-in-progress races).
    pub fn add_member(&self, room_id: &RoomId, member: Member) -> Result<(), CoreError> {
        let entry = self.entry(room_id).ok_or(CoreError::RoomNotFound)?;
        let mut entry = entry.lock().unwrap();
        if entry.members.contains_key(&member.user_id) {
            return Ok(());
        }
        entry.member_order.push(member.user_id.clone());
        entry.members.insert(member.user_id.clone(), member);
        Ok(())
    }

    pub fn remove_member(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Option<Removed> {
        let entry = self.entry(room_id)?;
        let mut entry = entry.lock().unwrap();
        let member = entry.members.remove(user_id)?;
        RoomEntry::remove_from_order(&mut entry.member_order, user_id);
        let should_close = entry.members.is_empty();
        Some(Removed { member, should_close })
    }

    /// Promote `new_owner_id` to owner, demoting the previous owner to
    /// `band_member`. Precondition: `new_owner_id` names an existing
    /// non-owner member.
    pub fn transfer_ownership(
        &self,
        room_id: &RoomId,
        new_owner_id: &UserId,
    ) -> Result<(Member, Member), CoreError> {
        let entry = self.entry(room_id).ok_or(CoreError::RoomNotFound)?;
        let mut entry = entry.lock().unwrap();

        if &entry.owner == new_owner_id {
            return Err(CoreError::NotAnOwner);
        }
        let Some(candidate) = entry.members.get(new_owner_id).cloned() else {
            return Err(CoreError::NotAnOwner);
        };

        let old_owner_id = entry.owner.clone();
        let old_owner = entry
            .members
            .get(&old_owner_id)
            .cloned()
            .unwrap_or_else(|| Member::new(old_owner_id.clone(), String::new(), Role::BandMember));

        let new_owner = candidate.with_role(Role::Owner);
        let old_owner = old_owner.with_role(Role::BandMember);

        entry.owner = new_owner_id.clone();
        entry.members.insert(new_owner.user_id.clone(), new_owner.clone());
        entry.members.insert(old_owner.user_id.clone(), old_owner.clone());

        Ok((new_owner, old_owner))
    }

    /// True iff membership (excluding pending members) is empty.
    pub fn should_close(&self, room_id: &RoomId) -> bool {
        match self.entry(room_id) {
            Some(entry) => entry.lock().unwrap().members.is_empty(),
            None => true,
        }
    }

    /// Deterministic "any remaining member" selection: lowest join order.
    /// Pinning this rule (rather than e.g. HashMap iteration order) is what
    /// makes ownership-transfer tests reproducible.
    pub fn any_member(&self, room_id: &RoomId) -> Option<Member> {
        let entry = self.entry(room_id)?;
        let entry = entry.lock().unwrap();
        let first = entry.member_order.first()?;
        entry.members.get(first).cloned()
    }

    /// Clamp `bpm` into `[bpm_min, bpm_max]`; reject `null`/non-numeric
    /// payloads outright. Always stamps `last_tick_timestamp_ms` to now on
    /// success, matching the observed contract that a tempo change touches
    /// the room's last-tick bookkeeping immediately, before the next tick.
    pub fn update_metronome_bpm(
        &self,
        room_id: &RoomId,
        raw_bpm: &serde_json::Value,
    ) -> Result<RoomSnapshot, CoreError> {
        let numeric = raw_bpm.as_f64().ok_or(CoreError::InvalidBpm)?;
        if !numeric.is_finite() {
            return Err(CoreError::InvalidBpm);
        }

        let entry = self.entry(room_id).ok_or(CoreError::RoomNotFound)?;
        let mut entry = entry.lock().unwrap();
        let bpm = self.config.clamp_bpm(numeric.round() as i64);
        entry.metronome = MetronomeConfig::new(bpm, clock::wall_ms());
        Ok(entry.snapshot(room_id))
    }

    pub fn get_metronome_state(&self, room_id: &RoomId) -> Option<MetronomeConfig> {
        let entry = self.entry(room_id)?;
        Some(entry.lock().unwrap().metronome)
    }

    /// Record a scheduler tick's timestamp without going through bpm
    /// validation — the scheduler only ever stamps a bpm it already read
    /// from validated state. Returns `false` if the room is gone, which
    /// tells the scheduler to stop.
    pub fn stamp_tick(&self, room_id: &RoomId, bpm: u32, wall_ms: u64) -> bool {
        match self.entry(room_id) {
            Some(entry) => {
                entry.lock().unwrap().metronome = MetronomeConfig::new(bpm, wall_ms);
                true
            }
            None => false,
        }
    }

    pub fn add_pending(&self, room_id: &RoomId, mut member: Member) -> Result<(), CoreError> {
        member.role = Role::BandMember;
        member.is_ready = false;

        let entry = self.entry(room_id).ok_or(CoreError::RoomNotFound)?;
        let mut entry = entry.lock().unwrap();
        if entry.pending.contains_key(&member.user_id) {
            return Ok(());
        }
        entry.pending_order.push(member.user_id.clone());
        entry.pending.insert(member.user_id.clone(), member);
        Ok(())
    }

    /// Move a pending applicant into membership, returning the promoted
    /// member (still `band_member`, approval doesn't grant ownership).
    pub fn approve_pending(&self, room_id: &RoomId, user_id: &UserId) -> Result<Member, CoreError> {
        let entry = self.entry(room_id).ok_or(CoreError::RoomNotFound)?;
        let mut entry = entry.lock().unwrap();
        let member = entry.pending.remove(user_id).ok_or(CoreError::NotPending)?;
        RoomEntry::remove_from_order(&mut entry.pending_order, user_id);
        entry.member_order.push(user_id.clone());
        entry.members.insert(user_id.clone(), member.clone());
        Ok(member)
    }

    /// Drop a pending applicant without ever touching membership.
    pub fn reject_pending(&self, room_id: &RoomId, user_id: &UserId) -> Result<Member, CoreError> {
        let entry = self.entry(room_id).ok_or(CoreError::RoomNotFound)?;
        let mut entry = entry.lock().unwrap();
        let member = entry.pending.remove(user_id).ok_or(CoreError::NotPending)?;
        RoomEntry::remove_from_order(&mut entry.pending_order, user_id);
        Ok(member)
    }

    pub fn is_pending(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        match self.entry(room_id) {
            Some(entry) => entry.lock().unwrap().pending.contains_key(user_id),
            None => false,
        }
    }

    /// Delete the room entirely. Called once `should_close` is true and the
    /// coordinator has finished broadcasting the closure.
    pub fn delete_room(&self, room_id: &RoomId) {
        self.rooms.write().unwrap().remove(room_id);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap().len()
    }
}
