//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p vanguard_server -- [--addr 127.0.0.1:41000] [--max-players 16]
//!       [--update-hz 40] [--snapshot-hz 10] [--password secret]
//!
//! The server listens for client connections, runs the fixed-step
//! simulation, and pushes game-state snapshots to connected clients.

use std::env;

use anyhow::Context;
use tracing::info;
use vanguard_server::host::ServerHost;
use vanguard_shared::components::{Component, Door, Transform, Trigger};
use vanguard_shared::config::GameConfig;
use vanguard_shared::math::Vec3;

fn parse_args() -> GameConfig {
    let mut cfg = GameConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--max-players" if i + 1 < args.len() => {
                cfg.max_players = args[i + 1].parse().unwrap_or(16);
                i += 2;
            }
            "--update-hz" if i + 1 < args.len() => {
                cfg.server_update_hz = args[i + 1].parse().unwrap_or(40);
                i += 2;
            }
            "--snapshot-hz" if i + 1 < args.len() => {
                cfg.snapshot_hz = args[i + 1].parse().unwrap_or(10);
                i += 2;
            }
            "--password" if i + 1 < args.len() => {
                cfg.password = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

/// Builds the built-in test arena until a level format lands: one door
/// behind a start button.
fn build_arena(host: &mut ServerHost) {
    let server = host.server_mut();
    server.assets_mut().precache_model("models/props/exit_door.mdl");
    server.assets_mut().precache_sound("sounds/door_open.wav");
    server.assets_mut().precache_material("materials/arena/floor.vmt");

    let world = server.world_mut();
    world
        .build()
        .with(Component::Transform(Transform {
            position: Vec3::new(0.0, 256.0, 0.0),
            ..Transform::default()
        }))
        .with(Component::Door(Door::default()))
        .with_key_value("targetname", "exit_door")
        .with_key_value("speed", "0.5")
        .spawn();
    world
        .build()
        .with(Component::Trigger(Trigger::default()))
        .with_key_value("targetname", "start_button")
        .with_key_value("outputs", "exit_door,Door.Open,0.5")
        .spawn();

    server.finish_level_load();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(
        addr = %cfg.server_addr,
        max_players = cfg.max_players,
        update_hz = cfg.server_update_hz,
        snapshot_hz = cfg.snapshot_hz,
        "Starting server"
    );

    let (mut host, local) = ServerHost::bind(cfg).await.context("bind server")?;
    info!(%local, "Server listening");

    build_arena(&mut host);
    host.run().await
}
