//! Grace-period reconnection: an abrupt disconnect (socket drop, not an
//! explicit leave_room) leaves a short window in which the same user
//! rejoining is folded back into the room instead of starting over, and
//! after which room ownership moves on without them.

mod common;

use std::time::Duration;

use bandroom_types::{ClientEvent, Role, ServerEvent};
use common::{connect, fast_config, spawn_server, DEFAULT_TIMEOUT};

#[test]
fn reconnecting_within_the_grace_period_does_not_duplicate_membership() {
    let (_server, addr) = spawn_server(fast_config());
    let mut owner = connect(&addr);
    owner
        .send(ClientEvent::CreateRoom {
            name: "Jam".into(),
            username: "alice".into(),
            user_id: "u-alice".into(),
            is_private: false,
            is_hidden: false,
        })
        .unwrap();
    let room_id = match owner.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::RoomCreated { room, .. }) => room.id,
        other => panic!("expected RoomCreated, got {:?}", other),
    };

    let member = connect(&addr);
    let mut member = member;
    member
        .send(ClientEvent::JoinRoom {
            room_id: room_id.clone(),
            username: "bob".into(),
            user_id: "u-bob".into(),
            role: Role::BandMember,
        })
        .unwrap();
    member.recv(DEFAULT_TIMEOUT);
    owner.recv_matching(DEFAULT_TIMEOUT, |e| matches!(e, ServerEvent::UserJoined { .. }));

    // Drop the socket outright rather than sending LeaveRoom — this is the
    // unintentional-disconnect path, which starts a grace window instead of
    // tearing the membership down immediately.
    drop(member);
    owner
        .recv_matching(DEFAULT_TIMEOUT, |e| matches!(e, ServerEvent::UserLeft { .. }))
        .expect("disconnect is announced right away, independent of the grace window");

    // Reconnect well inside the 150ms grace window configured by fast_config.
    let mut rejoined = connect(&addr);
    rejoined
        .send(ClientEvent::JoinRoom {
            room_id,
            username: "bob".into(),
            user_id: "u-bob".into(),
            role: Role::BandMember,
        })
        .unwrap();

    match rejoined.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::RoomJoined { users, .. }) => assert_eq!(users.len(), 2),
        other => panic!("expected RoomJoined, got {:?}", other),
    }
}

#[test]
fn owner_disconnect_transfers_ownership_once_the_grace_period_lapses() {
    let (_server, addr) = spawn_server(fast_config());
    let mut owner = connect(&addr);
    owner
        .send(ClientEvent::CreateRoom {
            name: "Jam".into(),
            username: "alice".into(),
            user_id: "u-alice".into(),
            is_private: false,
            is_hidden: false,
        })
        .unwrap();
    let room_id = match owner.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::RoomCreated { room, .. }) => room.id,
        other => panic!("expected RoomCreated, got {:?}", other),
    };

    let mut member = connect(&addr);
    member
        .send(ClientEvent::JoinRoom {
            room_id,
            username: "bob".into(),
            user_id: "u-bob".into(),
            role: Role::BandMember,
        })
        .unwrap();
    member.recv(DEFAULT_TIMEOUT);

    // Owner vanishes without leaving intentionally.
    drop(owner);

    // Grace period is 150ms and the sweeper runs every 250ms; give it time
    // to both expire the grace entry and run a sweep pass.
    match member.recv_matching(Duration::from_secs(2), |e| matches!(e, ServerEvent::OwnershipTransferred { .. })) {
        Some(ServerEvent::OwnershipTransferred { new_owner, old_owner }) => {
            assert_eq!(new_owner.user_id.as_str(), "u-bob");
            assert_eq!(old_owner.user_id.as_str(), "u-alice");
        }
        other => panic!("expected OwnershipTransferred, got {:?}", other),
    }
}
