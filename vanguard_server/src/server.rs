//! The authoritative game server.
//!
//! `GameServer` owns every connection slot, the entity world, and the asset
//! registry. It is single-threaded cooperative: the host feeds it decoded
//! packets and frame deltas; nothing here blocks or locks.
//!
//! Two independently clocked loops run inside `update`:
//! - the simulation timer (default 40 Hz): physics step, entity update
//!   dispatch, transform-listener dispatch, then dirty-flag clear — a strict
//!   sequence, listeners must observe the flags set this tick and the clear
//!   pass runs last;
//! - the snapshot timer (default 10 Hz): game-state payloads out through
//!   every connected bridge.

use std::net::SocketAddr;

use tracing::{debug, info, warn};
use vanguard_shared::archetype::EntityEvent;
use vanguard_shared::assets::{AssetId, AssetRegistry};
use vanguard_shared::commands::ClientCommands;
use vanguard_shared::components::{Component, PhysicsBody, Player, Transform};
use vanguard_shared::config::{GameConfig, MAX_FRAME_DELTA};
use vanguard_shared::net::{
    ClientId, EntityStateEntry, GameState, ServerMessage, PROTOCOL_VERSION,
};
use vanguard_shared::physics::{LinearPhysics, PhysicsBackend};
use vanguard_shared::world::{EntityId, EntityWorld};

use crate::bridge::ClientBridge;
use crate::connection::{ClientConnection, SessionState};

/// Units per second a player moves at full input deflection.
const PLAYER_SPEED: f32 = 200.0;

/// Game server core.
pub struct GameServer {
    cfg: GameConfig,
    world: EntityWorld,
    assets: AssetRegistry,
    physics: Box<dyn PhysicsBackend>,
    connections: Vec<ClientConnection>,

    sim_accum: f32,
    snap_accum: f32,
    tick: u64,
}

impl GameServer {
    pub fn new(cfg: GameConfig) -> Self {
        Self::with_physics(cfg, Box::new(LinearPhysics))
    }

    pub fn with_physics(cfg: GameConfig, physics: Box<dyn PhysicsBackend>) -> Self {
        let mut assets = AssetRegistry::new();
        // Every session spawns player avatars.
        assets.precache_model("models/player.mdl");

        Self {
            cfg,
            world: EntityWorld::new(),
            assets,
            physics,
            connections: Vec::new(),
            sim_accum: 0.0,
            snap_accum: 0.0,
            tick: 0,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.cfg
    }

    pub fn world(&self) -> &EntityWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut EntityWorld {
        &mut self.world
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetRegistry {
        &mut self.assets
    }

    /// Completed simulation ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn connection(&self, id: ClientId) -> Option<&ClientConnection> {
        self.connections.get(id.0 as usize)
    }

    pub fn connected_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.state() == SessionState::Connected)
            .count()
    }

    /// Announces the end of level construction to every interested entity,
    /// including ones spawned after the dispatch tables were built.
    pub fn finish_level_load(&mut self) {
        info!(entities = self.world.len(), assets = self.assets.len(), "level loaded");
        self.world.dispatch_group(&EntityEvent::MapLoaded);
    }

    // ─── Protocol handlers ───

    /// First contact. Allocates or recycles a slot; trusted in-process
    /// bridges skip straight to spawn.
    pub fn receive_join_request(
        &mut self,
        addr: SocketAddr,
        name: &str,
        protocol: u32,
        mut bridge: Box<dyn ClientBridge>,
    ) -> Option<ClientId> {
        if protocol != PROTOCOL_VERSION {
            warn!(%addr, protocol, "join with wrong protocol version");
            let _ = bridge.send(&ServerMessage::Disconnect {
                reason: "protocol version mismatch".to_string(),
            });
            return None;
        }

        let idx = match self.allocate_slot(addr, bridge) {
            Some(idx) => idx,
            None => return None,
        };
        let id = self.connections[idx].id();
        self.connections[idx].player_name = name.to_string();
        info!(client = ?id, %addr, player = %name, "join request");

        if self.connections[idx].bridge.is_local() {
            // Trusted bridge: no credentials, no precache round trip.
            let entity = self.spawn_player_entity(name);
            let conn = &mut self.connections[idx];
            conn.entity = Some(entity);
            conn.force(SessionState::Joining);
            let _ = conn.bridge.send(&ServerMessage::SpawnResponse {
                client_id: id,
                entity,
            });
        } else {
            let conn = &mut self.connections[idx];
            conn.advance(SessionState::Authenticating);
            let _ = conn.bridge.send(&ServerMessage::AuthRequest);
        }
        Some(id)
    }

    /// Credential check. Validation is a stub: an empty configured password
    /// accepts everything.
    pub fn receive_auth_response(&mut self, id: ClientId, password: &str) {
        if !self.expect_state(id, SessionState::Authenticating, "AuthResponse") {
            return;
        }
        if !self.cfg.password.is_empty() && self.cfg.password != password {
            self.terminate(id, "invalid password");
            return;
        }
        let manifest = self.assets.manifest();
        let conn = &mut self.connections[id.0 as usize];
        conn.advance(SessionState::Downloading);
        let _ = conn.bridge.send(&ServerMessage::AssetInfoRequest(manifest));
    }

    /// Client's verdict on the precache manifest. Any missing asset is
    /// fatal for the connection: download support is unimplemented.
    pub fn receive_asset_info_response(
        &mut self,
        id: ClientId,
        missing: &[AssetId],
        hashes: &[(AssetId, u64)],
    ) {
        if !self.expect_state(id, SessionState::Downloading, "AssetInfoResponse") {
            return;
        }
        if !missing.is_empty() {
            self.terminate(id, &format!("missing {} required asset(s)", missing.len()));
            return;
        }
        for (asset_id, hash) in hashes {
            if let Some(entry) = self.assets.get(*asset_id) {
                if entry.content_hash() != *hash {
                    debug!(client = ?id, asset = %entry.name, "client asset hash differs");
                }
            }
        }
        let conn = &mut self.connections[id.0 as usize];
        let _ = conn.bridge.send(&ServerMessage::AssetPayload { total_bytes: 0 });
    }

    /// Places the client's entity into the world.
    pub fn receive_spawn_request(&mut self, id: ClientId) {
        if !self.expect_state(id, SessionState::Downloading, "SpawnRequest") {
            return;
        }
        let name = self.connections[id.0 as usize].player_name.clone();
        let entity = self.spawn_player_entity(&name);
        let conn = &mut self.connections[id.0 as usize];
        conn.entity = Some(entity);
        conn.advance(SessionState::Joining);
        let _ = conn.bridge.send(&ServerMessage::SpawnResponse {
            client_id: id,
            entity,
        });
    }

    /// Only after this acknowledgement may the server accept input.
    pub fn receive_spawn_complete(&mut self, id: ClientId) {
        if !self.expect_state(id, SessionState::Joining, "SpawnComplete") {
            return;
        }
        let conn = &mut self.connections[id.0 as usize];
        conn.advance(SessionState::Connected);
        let _ = conn.bridge.send(&ServerMessage::SpawnCompleteAck);
        info!(client = ?id, "session live");
    }

    /// Input before `Connected` is logged and dropped, never fatal.
    pub fn receive_input_payload(&mut self, id: ClientId, cmd: ClientCommands) {
        let Some(conn) = self.connections.get_mut(id.0 as usize) else {
            warn!(client = ?id, "input for unknown connection");
            return;
        };
        if conn.state() != SessionState::Connected {
            warn!(client = ?id, state = ?conn.state(), "dropping input before spawn complete");
            return;
        }
        conn.inputs.record(cmd);
    }

    /// Scripted event addressed at a named entity input.
    pub fn receive_event_payload(
        &mut self,
        id: ClientId,
        target: &str,
        input: &str,
        parameter: Option<&str>,
    ) {
        if !self.expect_state(id, SessionState::Connected, "EventPayload") {
            return;
        }
        self.world.fire_named_input(target, input, parameter);
    }

    /// Malformed traffic always costs the connection.
    pub fn receive_invalid_packet(&mut self, id: ClientId) {
        self.terminate(id, "protocol violation");
    }

    /// The single exit path: notify the peer, despawn the avatar, free the
    /// slot for reuse. Failures here never touch other connections.
    pub fn terminate(&mut self, id: ClientId, reason: &str) {
        let Some(conn) = self.connections.get(id.0 as usize) else {
            return;
        };
        if conn.state() == SessionState::Disconnected {
            return;
        }
        if let Some(entity) = self.connections[id.0 as usize].entity.take() {
            self.world.despawn(entity);
        }
        let conn = &mut self.connections[id.0 as usize];
        let _ = conn.bridge.send(&ServerMessage::Disconnect {
            reason: reason.to_string(),
        });
        conn.force(SessionState::Disconnected);
        info!(client = ?id, reason = %reason, "connection terminated");
    }

    // ─── Fixed-step loops ───

    /// Advances both fixed-step timers. Oversized deltas are discarded
    /// outright so a stall cannot snowball into a catch-up spiral.
    pub fn update(&mut self, delta: f32) {
        if delta > MAX_FRAME_DELTA {
            warn!(delta, "discarding oversized frame delta");
            return;
        }
        let sim_dt = self.cfg.update_dt();
        self.sim_accum += delta;
        while self.sim_accum >= sim_dt {
            self.sim_accum -= sim_dt;
            self.simulation_tick(sim_dt);
        }

        let snap_dt = self.cfg.snapshot_dt();
        self.snap_accum += delta;
        while self.snap_accum >= snap_dt {
            self.snap_accum -= snap_dt;
            self.snapshot_tick();
        }
    }

    fn simulation_tick(&mut self, dt: f32) {
        self.apply_player_inputs();
        self.physics.step(&mut self.world, dt);
        self.world.dispatch_to_all(&EntityEvent::ServerUpdate { dt });
        for id in self.world.dirty_ids() {
            self.world.dispatch(id, &EntityEvent::TransformChanged);
        }
        self.world.service_outputs(dt);
        // Last, so listeners saw every flag set this tick.
        self.world.clear_dirty_flags();
        self.tick += 1;
    }

    fn snapshot_tick(&mut self) {
        let state = self.build_game_state();
        for conn in &mut self.connections {
            if conn.state() == SessionState::Connected {
                let _ = conn
                    .bridge
                    .send(&ServerMessage::GameStatePayload(state.clone()));
            }
        }
    }

    /// Steers each connected avatar from the latest buffered input.
    fn apply_player_inputs(&mut self) {
        for idx in 0..self.connections.len() {
            let conn = &self.connections[idx];
            if conn.state() != SessionState::Connected {
                continue;
            }
            let (Some(entity), Some(cmd)) = (conn.entity, conn.inputs.recent(0).copied()) else {
                continue;
            };
            if let Some(body) = self.world.entity_mut(entity).and_then(|e| e.physics_body_mut()) {
                body.velocity = cmd.move_dir.scale(PLAYER_SPEED);
            }
            if let Some(t) = self.world.entity_mut(entity).and_then(|e| e.transform_mut()) {
                t.angles = cmd.view;
            }
        }
    }

    fn build_game_state(&self) -> GameState {
        let mut entities = Vec::new();
        for id in self.world.ids() {
            if let Some(t) = self.world.entity(id).and_then(|e| e.transform()) {
                entities.push(EntityStateEntry {
                    id,
                    position: t.position,
                    angles: t.angles,
                });
            }
        }
        GameState {
            tick: self.tick,
            entities,
        }
    }

    // ─── Internals ───

    fn spawn_player_entity(&mut self, name: &str) -> EntityId {
        self.world
            .build()
            .with(Component::Transform(Transform::default()))
            .with(Component::PhysicsBody(PhysicsBody::default()))
            .with(Component::Player(Player {
                name: name.to_string(),
            }))
            .spawn()
    }

    /// Finds a reusable slot or grows the table up to `max_players`.
    fn allocate_slot(
        &mut self,
        addr: SocketAddr,
        mut bridge: Box<dyn ClientBridge>,
    ) -> Option<usize> {
        if let Some(idx) = self
            .connections
            .iter()
            .position(|c| c.state() == SessionState::Disconnected)
        {
            self.connections[idx].rebind(addr, bridge);
            return Some(idx);
        }
        if self.connections.len() < self.cfg.max_players {
            let idx = self.connections.len();
            self.connections
                .push(ClientConnection::new(ClientId(idx as u32), addr, bridge));
            return Some(idx);
        }
        warn!(%addr, "rejecting join, server full");
        let _ = bridge.send(&ServerMessage::Disconnect {
            reason: "server is full".to_string(),
        });
        None
    }

    /// Validates the handler precondition; any other state is a protocol
    /// violation and costs the connection.
    fn expect_state(&mut self, id: ClientId, expected: SessionState, packet: &str) -> bool {
        let Some(conn) = self.connections.get(id.0 as usize) else {
            warn!(client = ?id, packet, "packet for unknown connection");
            return false;
        };
        if conn.state() == expected {
            return true;
        }
        warn!(
            client = ?id,
            packet,
            state = ?conn.state(),
            expected = ?expected,
            "out-of-order packet"
        );
        self.terminate(id, "protocol violation");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LoopbackBridge;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn bypass_bridge_skips_auth_and_precache() {
        let mut server = GameServer::new(GameConfig::default());
        let (bridge, rx) = LoopbackBridge::pair();
        let id = server
            .receive_join_request(test_addr(), "Local", PROTOCOL_VERSION, Box::new(bridge))
            .unwrap();

        assert_eq!(server.connection(id).unwrap().state(), SessionState::Joining);
        let sent = rx.drain();
        assert!(matches!(sent[0], ServerMessage::SpawnResponse { .. }));

        server.receive_spawn_complete(id);
        assert_eq!(
            server.connection(id).unwrap().state(),
            SessionState::Connected
        );
    }

    #[test]
    fn accumulator_fires_exactly_once_for_two_half_ticks() {
        let mut server = GameServer::new(GameConfig::default());
        // 40 Hz simulation, two updates at 1/80 s: one tick, not zero, not two.
        server.update(1.0 / 80.0);
        assert_eq!(server.tick(), 0);
        server.update(1.0 / 80.0);
        assert_eq!(server.tick(), 1);
    }

    #[test]
    fn oversized_delta_is_discarded() {
        let mut server = GameServer::new(GameConfig::default());
        server.update(0.5);
        assert_eq!(server.tick(), 0);
    }

    #[test]
    fn wrong_protocol_version_is_rejected() {
        let mut server = GameServer::new(GameConfig::default());
        let (bridge, rx) = LoopbackBridge::pair();
        let id = server.receive_join_request(test_addr(), "Old", 999, Box::new(bridge));
        assert!(id.is_none());
        assert!(matches!(
            rx.pop(),
            Some(ServerMessage::Disconnect { .. })
        ));
    }
}
