//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p vanguard_client -- [--addr 127.0.0.1:41000] [--name Player]
//!       [--password secret]
//!
//! Connects, walks forward for a few seconds, and logs received snapshots.

use std::env;
use std::time::Duration;

use tracing::info;
use vanguard_client::GameClient;
use vanguard_shared::commands::ActionFlags;
use vanguard_shared::config::GameConfig;
use vanguard_shared::math::{Angles, Vec3};

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
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    let mut client = GameClient::connect(&cfg).await?;

    for _ in 0..200 {
        client
            .send_input(
                Vec3::new(0.0, 1.0, 0.0),
                Angles::new(0.0, 90.0, 0.0),
                ActionFlags::empty(),
            )
            .await?;
        if let Some(msg) = client.poll_message(Duration::from_millis(30)).await? {
            if let vanguard_shared::net::ServerMessage::GameStatePayload(state) = msg {
                info!(tick = state.tick, entities = state.entities.len(), "snapshot");
            }
        }
    }
    Ok(())
}
