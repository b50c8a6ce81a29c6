//! End-to-end handshake coverage: creating a room and joining it over real
//! TCP sockets, exercising the framing and dispatch path together rather
//! than just the coordinator in isolation (see bandroom-core's own unit
//! tests for that).

mod common;

use std::time::Duration;

use bandroom_types::{ClientEvent, Role, ServerEvent};
use common::{connect, fast_config, spawn_server, DEFAULT_TIMEOUT};

#[test]
fn create_room_yields_owner_snapshot() {
    let (_server, addr) = spawn_server(fast_config());
    let mut owner = connect(&addr);

    owner
        .send(ClientEvent::CreateRoom {
            name: "Jam Session".into(),
            username: "alice".into(),
            user_id: "u-alice".into(),
            is_private: false,
            is_hidden: false,
        })
        .unwrap();

    match owner.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::RoomCreated { room, user }) => {
            assert_eq!(room.owner.as_str(), "u-alice");
            assert_eq!(room.users.len(), 1);
            assert_eq!(user.role, Role::Owner);
        }
        other => panic!("expected RoomCreated, got {:?}", other),
    }
}

#[test]
fn second_user_joining_is_announced_to_the_first() {
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

    let mut bandmate = connect(&addr);
    bandmate
        .send(ClientEvent::JoinRoom {
            room_id: room_id.clone(),
            username: "bob".into(),
            user_id: "u-bob".into(),
            role: Role::BandMember,
        })
        .unwrap();

    match bandmate.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::RoomJoined { room, users, .. }) => {
            assert_eq!(room.id, room_id);
            assert_eq!(users.len(), 2);
        }
        other => panic!("expected RoomJoined, got {:?}", other),
    }

    match owner.recv_matching(DEFAULT_TIMEOUT, |e| matches!(e, ServerEvent::UserJoined { .. })) {
        Some(ServerEvent::UserJoined { user }) => assert_eq!(user.user_id.as_str(), "u-bob"),
        other => panic!("expected UserJoined, got {:?}", other),
    }
}

#[test]
fn leave_room_is_confirmed_and_announced() {
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

    let mut bandmate = connect(&addr);
    bandmate
        .send(ClientEvent::JoinRoom {
            room_id,
            username: "bob".into(),
            user_id: "u-bob".into(),
            role: Role::BandMember,
        })
        .unwrap();
    bandmate.recv(DEFAULT_TIMEOUT);
    owner.recv_matching(DEFAULT_TIMEOUT, |e| matches!(e, ServerEvent::UserJoined { .. }));

    bandmate.send(ClientEvent::LeaveRoom {}).unwrap();

    match bandmate.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::LeaveConfirmed { .. }) => {}
        other => panic!("expected LeaveConfirmed, got {:?}", other),
    }
    match owner.recv_matching(DEFAULT_TIMEOUT, |e| matches!(e, ServerEvent::UserLeft { .. })) {
        Some(ServerEvent::UserLeft { user }) => assert_eq!(user.user_id.as_str(), "u-bob"),
        other => panic!("expected UserLeft, got {:?}", other),
    }
}

#[test]
fn joining_a_private_room_is_redirected_to_approval() {
    let (_server, addr) = spawn_server(fast_config());
    let mut owner = connect(&addr);
    owner
        .send(ClientEvent::CreateRoom {
            name: "Invite Only".into(),
            username: "alice".into(),
            user_id: "u-alice".into(),
            is_private: true,
            is_hidden: false,
        })
        .unwrap();
    let room_id = match owner.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::RoomCreated { room, .. }) => room.id,
        other => panic!("expected RoomCreated, got {:?}", other),
    };

    let mut hopeful = connect(&addr);
    hopeful
        .send(ClientEvent::JoinRoom {
            room_id: room_id.clone(),
            username: "carol".into(),
            user_id: "u-carol".into(),
            role: Role::BandMember,
        })
        .unwrap();

    match hopeful.recv(DEFAULT_TIMEOUT) {
        Some(ServerEvent::RedirectToApproval { room_id: rid, .. }) => assert_eq!(rid, room_id),
        other => panic!("expected RedirectToApproval, got {:?}", other),
    }
}

#[test]
fn unknown_room_join_surfaces_an_error_to_the_caller() {
    let (_server, addr) = spawn_server(fast_config());
    let mut client = connect(&addr);
    client
        .send(ClientEvent::JoinRoom {
            room_id: "room_does_not_exist".into(),
            username: "nobody".into(),
            user_id: "u-nobody".into(),
            role: Role::Audience,
        })
        .unwrap();

    match client.recv(Duration::from_secs(1)) {
        Some(ServerEvent::Error { .. }) => {}
        other => panic!("expected Error, got {:?}", other),
    }
}
