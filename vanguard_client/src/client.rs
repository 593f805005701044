//! Client implementation.
//!
//! `connect` drives the whole join handshake over the framed TCP stream:
//! join → credentials → precache check → spawn → spawn-complete ack. After
//! that the client submits per-tick input and consumes game-state payloads.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use vanguard_shared::commands::{ActionFlags, ClientCommands};
use vanguard_shared::config::GameConfig;
use vanguard_shared::math::{Angles, Vec3};
use vanguard_shared::net::{
    ClientId, ClientMessage, FramedConn, GameState, ServerMessage, PROTOCOL_VERSION,
};
use vanguard_shared::world::EntityId;

/// High-level game client.
pub struct GameClient {
    conn: FramedConn,
    pub client_id: ClientId,
    /// The avatar entity assigned by the server.
    pub entity: EntityId,
    pub last_state: Option<GameState>,
    tick: u32,
    start: std::time::Instant,
}

impl GameClient {
    /// Connects and performs the full join handshake. Returns only once the
    /// session is live.
    pub async fn connect(cfg: &GameConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %server_addr, "Connecting to server");

        let stream = TcpStream::connect(server_addr)
            .await
            .context("tcp connect")?;
        let mut conn = FramedConn::new(stream);

        conn.send(&ClientMessage::JoinRequest {
            protocol: PROTOCOL_VERSION,
            name: cfg.player_name.clone(),
        })
        .await?;

        let mut ids: Option<(ClientId, EntityId)> = None;
        loop {
            let msg: ServerMessage = conn.recv().await?;
            match msg {
                ServerMessage::AuthRequest => {
                    conn.send(&ClientMessage::AuthResponse {
                        password: cfg.password.clone(),
                    })
                    .await?;
                }
                ServerMessage::AssetInfoRequest(manifest) => {
                    // No local asset store yet: report everything resolved
                    // and echo the server's hashes back.
                    debug!(assets = manifest.len(), "precache manifest received");
                    let hashes = manifest
                        .entries
                        .iter()
                        .map(|e| (e.id, e.hash))
                        .collect();
                    conn.send(&ClientMessage::AssetInfoResponse {
                        missing: Vec::new(),
                        hashes,
                    })
                    .await?;
                }
                ServerMessage::AssetPayload { .. } => {
                    conn.send(&ClientMessage::SpawnRequest).await?;
                }
                ServerMessage::SpawnResponse { client_id, entity } => {
                    ids = Some((client_id, entity));
                    conn.send(&ClientMessage::SpawnComplete).await?;
                }
                ServerMessage::SpawnCompleteAck => {
                    let (client_id, entity) =
                        ids.context("spawn ack before spawn response")?;
                    info!(client_id = ?client_id, entity = ?entity, "session live");
                    return Ok(Self {
                        conn,
                        client_id,
                        entity,
                        last_state: None,
                        tick: 0,
                        start: std::time::Instant::now(),
                    });
                }
                ServerMessage::Disconnect { reason } => {
                    anyhow::bail!("server refused connection: {reason}");
                }
                other => {
                    warn!(?other, "unexpected handshake message");
                }
            }
        }
    }

    /// Samples and submits one tick of input.
    pub async fn send_input(
        &mut self,
        move_dir: Vec3,
        view: Angles,
        actions: ActionFlags,
    ) -> anyhow::Result<()> {
        self.tick += 1;
        let cmd = ClientCommands {
            tick: self.tick,
            timestamp: self.start.elapsed().as_secs_f64(),
            move_dir,
            view,
            actions,
        };
        self.conn.send(&ClientMessage::InputPayload(cmd)).await
    }

    /// Fires a scripted input on a named server entity.
    pub async fn send_event(
        &mut self,
        target: &str,
        input: &str,
        parameter: Option<String>,
    ) -> anyhow::Result<()> {
        self.conn
            .send(&ClientMessage::EventPayload {
                target: target.to_string(),
                input: input.to_string(),
                parameter,
            })
            .await
    }

    /// Waits up to `timeout` for the next server message, tracking
    /// game-state payloads.
    pub async fn poll_message(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<Option<ServerMessage>> {
        let msg = match tokio::time::timeout(timeout, self.conn.recv::<ServerMessage>()).await {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };
        if let ServerMessage::GameStatePayload(state) = &msg {
            self.last_state = Some(state.clone());
        }
        Ok(Some(msg))
    }
}
