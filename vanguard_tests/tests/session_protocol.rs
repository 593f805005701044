//! Protocol state-machine tests against the server core, no sockets.
//!
//! Remote sessions are driven through a `RemoteBridge` whose channel the
//! test holds; bypass sessions use the in-process `LoopbackBridge`.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use vanguard_server::bridge::{LoopbackBridge, RemoteBridge};
use vanguard_server::connection::SessionState;
use vanguard_server::server::GameServer;
use vanguard_shared::assets::AssetId;
use vanguard_shared::commands::ClientCommands;
use vanguard_shared::components::{Component, Door, Transform};
use vanguard_shared::config::GameConfig;
use vanguard_shared::math::Vec3;
use vanguard_shared::net::{ClientId, ServerMessage, PROTOCOL_VERSION};

fn addr() -> SocketAddr {
    "203.0.113.9:27015".parse().unwrap()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

/// Joins over a remote (untrusted) bridge; returns the id and the outbound
/// message stream.
fn remote_join(server: &mut GameServer) -> (ClientId, mpsc::UnboundedReceiver<ServerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = server
        .receive_join_request(addr(), "Remote", PROTOCOL_VERSION, Box::new(RemoteBridge::new(tx)))
        .expect("join accepted");
    (id, rx)
}

fn state_of(server: &GameServer, id: ClientId) -> SessionState {
    server.connection(id).unwrap().state()
}

fn cmd(tick: u32) -> ClientCommands {
    ClientCommands {
        tick,
        move_dir: Vec3::new(1.0, 0.0, 0.0),
        ..ClientCommands::default()
    }
}

#[test]
fn remote_handshake_walks_every_state() {
    let mut server = GameServer::new(GameConfig::default());
    let (id, mut rx) = remote_join(&mut server);
    assert_eq!(state_of(&server, id), SessionState::Authenticating);
    assert!(matches!(rx.try_recv(), Ok(ServerMessage::AuthRequest)));

    server.receive_auth_response(id, "");
    assert_eq!(state_of(&server, id), SessionState::Downloading);
    assert!(matches!(
        rx.try_recv(),
        Ok(ServerMessage::AssetInfoRequest(_))
    ));

    server.receive_asset_info_response(id, &[], &[]);
    assert_eq!(state_of(&server, id), SessionState::Downloading);
    assert!(matches!(
        rx.try_recv(),
        Ok(ServerMessage::AssetPayload { .. })
    ));

    server.receive_spawn_request(id);
    assert_eq!(state_of(&server, id), SessionState::Joining);
    assert!(matches!(
        rx.try_recv(),
        Ok(ServerMessage::SpawnResponse { .. })
    ));

    server.receive_spawn_complete(id);
    assert_eq!(state_of(&server, id), SessionState::Connected);
    assert!(matches!(rx.try_recv(), Ok(ServerMessage::SpawnCompleteAck)));
}

#[test]
fn missing_assets_always_disconnect_with_count() {
    let mut server = GameServer::new(GameConfig::default());
    let (id, mut rx) = remote_join(&mut server);
    server.receive_auth_response(id, "");

    server.receive_asset_info_response(id, &[AssetId(0), AssetId(7)], &[]);
    assert_eq!(state_of(&server, id), SessionState::Disconnected);

    let reasons: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::Disconnect { reason } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("missing 2 required"), "got: {}", reasons[0]);
}

#[test]
fn input_before_connected_is_a_noop() {
    let mut server = GameServer::new(GameConfig::default());
    let (id, _rx) = remote_join(&mut server);
    server.receive_auth_response(id, "");

    server.receive_input_payload(id, cmd(1));
    // Not fatal, and nothing was buffered.
    assert_eq!(state_of(&server, id), SessionState::Downloading);
    assert_eq!(server.connection(id).unwrap().inputs.recorded(), 0);
}

#[test]
fn input_after_connected_lands_in_ring() {
    let mut server = GameServer::new(GameConfig::default());
    let (id, _rx) = remote_join(&mut server);
    server.receive_auth_response(id, "");
    server.receive_asset_info_response(id, &[], &[]);
    server.receive_spawn_request(id);
    server.receive_spawn_complete(id);

    for t in 1..=100 {
        server.receive_input_payload(id, cmd(t));
    }
    let ring = &server.connection(id).unwrap().inputs;
    assert_eq!(ring.recorded(), 100);
    assert_eq!(ring.recent(0).unwrap().tick, 100);
    assert_eq!(ring.recent(63).unwrap().tick, 37);
    assert!(ring.recent(64).is_none());
}

#[test]
fn out_of_order_packet_terminates_with_generic_reason() {
    let mut server = GameServer::new(GameConfig::default());
    let (id, mut rx) = remote_join(&mut server);

    // SpawnRequest while still authenticating.
    server.receive_spawn_request(id);
    assert_eq!(state_of(&server, id), SessionState::Disconnected);

    let has_violation = drain(&mut rx).iter().any(|m| {
        matches!(m, ServerMessage::Disconnect { reason } if reason == "protocol violation")
    });
    assert!(has_violation);
}

#[test]
fn invalid_packet_always_terminates() {
    let mut server = GameServer::new(GameConfig::default());
    let (id, _rx) = remote_join(&mut server);
    server.receive_invalid_packet(id);
    assert_eq!(state_of(&server, id), SessionState::Disconnected);
}

#[test]
fn wrong_password_terminates() {
    let cfg = GameConfig {
        password: "hunter2".to_string(),
        ..GameConfig::default()
    };
    let mut server = GameServer::new(cfg);
    let (id, _rx) = remote_join(&mut server);
    server.receive_auth_response(id, "wrong");
    assert_eq!(state_of(&server, id), SessionState::Disconnected);
}

#[test]
fn bypass_bridge_connects_without_auth_or_precache_round_trip() {
    let mut server = GameServer::new(GameConfig::default());
    let (bridge, rx) = LoopbackBridge::pair();
    let id = server
        .receive_join_request(addr(), "Local", PROTOCOL_VERSION, Box::new(bridge))
        .unwrap();
    server.receive_spawn_complete(id);
    assert_eq!(state_of(&server, id), SessionState::Connected);

    // The bridge never saw an auth or asset round trip.
    for msg in rx.drain() {
        assert!(
            !matches!(msg, ServerMessage::AuthRequest | ServerMessage::AssetInfoRequest(_)),
            "bypass session saw {msg:?}"
        );
    }
}

#[test]
fn per_connection_failure_leaves_others_alone() {
    let mut server = GameServer::new(GameConfig::default());
    let (good, _rx_good) = remote_join(&mut server);
    server.receive_auth_response(good, "");
    server.receive_asset_info_response(good, &[], &[]);
    server.receive_spawn_request(good);
    server.receive_spawn_complete(good);

    let (bad, _rx_bad) = remote_join(&mut server);
    server.receive_asset_info_response(bad, &[AssetId(1)], &[]);

    assert_eq!(state_of(&server, bad), SessionState::Disconnected);
    assert_eq!(state_of(&server, good), SessionState::Connected);
    assert_eq!(server.connected_count(), 1);
}

#[test]
fn full_server_rejects_with_reason() {
    let cfg = GameConfig {
        max_players: 1,
        ..GameConfig::default()
    };
    let mut server = GameServer::new(cfg);
    let (_id, _rx) = remote_join(&mut server);

    let (tx, mut rx2) = mpsc::unbounded_channel();
    let refused = server.receive_join_request(
        addr(),
        "Late",
        PROTOCOL_VERSION,
        Box::new(RemoteBridge::new(tx)),
    );
    assert!(refused.is_none());
    assert!(matches!(
        rx2.try_recv(),
        Ok(ServerMessage::Disconnect { reason }) if reason == "server is full"
    ));
}

#[test]
fn disconnected_slot_is_recycled_for_new_peer() {
    let cfg = GameConfig {
        max_players: 1,
        ..GameConfig::default()
    };
    let mut server = GameServer::new(cfg);
    let (first, _rx) = remote_join(&mut server);
    server.terminate(first, "test over");
    assert_eq!(state_of(&server, first), SessionState::Disconnected);

    let (second, _rx2) = remote_join(&mut server);
    assert_eq!(first, second);
    assert_eq!(state_of(&server, second), SessionState::Authenticating);
    assert_eq!(server.connection(second).unwrap().inputs.recorded(), 0);
}

#[test]
fn snapshot_timer_fires_independently_of_simulation() {
    let mut server = GameServer::new(GameConfig::default());
    let (bridge, rx) = LoopbackBridge::pair();
    let id = server
        .receive_join_request(addr(), "Local", PROTOCOL_VERSION, Box::new(bridge))
        .unwrap();
    server.receive_spawn_complete(id);
    rx.drain();

    // Two 50 ms frames: four simulation ticks, exactly one snapshot.
    server.update(0.05);
    server.update(0.05);
    assert_eq!(server.tick(), 4);

    let snapshots = rx
        .drain()
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::GameStatePayload(_)))
        .count();
    assert_eq!(snapshots, 1);
}

#[test]
fn event_payload_reaches_named_entity() {
    let mut server = GameServer::new(GameConfig::default());
    server
        .world_mut()
        .build()
        .with(Component::Transform(Transform::default()))
        .with(Component::Door(Door::default()))
        .with_key_value("targetname", "exit_door")
        .spawn();

    let (bridge, _rx) = LoopbackBridge::pair();
    let id = server
        .receive_join_request(addr(), "Local", PROTOCOL_VERSION, Box::new(bridge))
        .unwrap();
    server.receive_spawn_complete(id);

    server.receive_event_payload(id, "exit_door", "Door.Open", None);
    let door_id = server.world().find_by_name("exit_door")[0];
    assert!(server.world().entity(door_id).unwrap().door().unwrap().open);
}

#[test]
fn terminate_despawns_the_avatar() {
    let mut server = GameServer::new(GameConfig::default());
    let (bridge, _rx) = LoopbackBridge::pair();
    let id = server
        .receive_join_request(addr(), "Local", PROTOCOL_VERSION, Box::new(bridge))
        .unwrap();
    let entity = server.connection(id).unwrap().entity.unwrap();
    assert!(server.world().entity(entity).is_some());

    server.terminate(id, "leaving");
    assert!(server.world().entity(entity).is_none());
}
