//! Network host: the only place real asynchrony happens.
//!
//! Each accepted TCP connection gets a reader task (frames → inbound event
//! queue) and a writer task (bridge channel → frames). The main loop drains
//! the queue into the synchronous `GameServer` handlers and drives
//! `update()` at a fixed cadence, so every mutation of server state happens
//! on one logical thread.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vanguard_shared::config::GameConfig;
use vanguard_shared::net::{read_frame, write_frame, ClientId, ClientMessage, ServerMessage};

use crate::bridge::RemoteBridge;
use crate::server::GameServer;

/// Inbound event from a transport task.
enum HostEvent {
    Connected {
        token: u64,
        addr: SocketAddr,
        tx: mpsc::UnboundedSender<ServerMessage>,
    },
    Packet {
        token: u64,
        msg: ClientMessage,
    },
    Malformed {
        token: u64,
    },
    Closed {
        token: u64,
    },
}

struct Session {
    addr: SocketAddr,
    /// Held until the join request arrives, then moved into the bridge.
    pending_tx: Option<mpsc::UnboundedSender<ServerMessage>>,
    client: Option<ClientId>,
}

/// Owns the listener, the transport tasks, and the server core.
pub struct ServerHost {
    server: GameServer,
    events_rx: mpsc::UnboundedReceiver<HostEvent>,
    sessions: HashMap<u64, Session>,
}

impl ServerHost {
    /// Binds the listen socket and spawns the accept loop.
    pub async fn bind(cfg: GameConfig) -> anyhow::Result<(Self, SocketAddr)> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        let local = listener.local_addr().context("local_addr")?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(accept_loop(listener, events_tx));

        Ok((
            Self {
                server: GameServer::new(cfg),
                events_rx,
                sessions: HashMap::new(),
            },
            local,
        ))
    }

    pub fn server(&self) -> &GameServer {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut GameServer {
        &mut self.server
    }

    /// Runs until the process is stopped.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let frame = Duration::from_secs_f32(self.server.config().update_dt());
        let mut next = tokio::time::Instant::now();
        loop {
            self.pump(frame.as_secs_f32());
            next += frame;
            tokio::time::sleep_until(next).await;
        }
    }

    /// Runs a bounded number of frames; used by tests.
    pub async fn run_frames(&mut self, frames: usize) -> anyhow::Result<()> {
        let frame = Duration::from_secs_f32(self.server.config().update_dt());
        let mut next = tokio::time::Instant::now();
        for _ in 0..frames {
            self.pump(frame.as_secs_f32());
            next += frame;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// One host frame: drain transport events, then advance the timers.
    fn pump(&mut self, delta: f32) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        self.server.update(delta);
    }

    fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Connected { token, addr, tx } => {
                debug!(token, %addr, "transport connected");
                self.sessions.insert(
                    token,
                    Session {
                        addr,
                        pending_tx: Some(tx),
                        client: None,
                    },
                );
            }
            HostEvent::Packet { token, msg } => self.handle_packet(token, msg),
            HostEvent::Malformed { token } => {
                match self.sessions.get(&token).and_then(|s| s.client) {
                    Some(id) => self.server.receive_invalid_packet(id),
                    None => {
                        debug!(token, "malformed packet before join");
                        self.sessions.remove(&token);
                    }
                }
            }
            HostEvent::Closed { token } => {
                if let Some(session) = self.sessions.remove(&token) {
                    if let Some(id) = session.client {
                        self.server.terminate(id, "client disconnected");
                    }
                }
            }
        }
    }

    fn handle_packet(&mut self, token: u64, msg: ClientMessage) {
        let Some(session) = self.sessions.get_mut(&token) else {
            debug!(token, "packet for unknown transport session");
            return;
        };

        if let ClientMessage::JoinRequest { protocol, name } = &msg {
            let Some(tx) = session.pending_tx.take() else {
                // Duplicate join on the same transport.
                if let Some(id) = session.client {
                    self.server.receive_invalid_packet(id);
                }
                return;
            };
            let addr = session.addr;
            let bridge = Box::new(RemoteBridge::new(tx));
            session.client = self.server.receive_join_request(addr, name, *protocol, bridge);
            return;
        }

        let Some(id) = session.client else {
            debug!(token, "packet before join request");
            return;
        };
        match msg {
            ClientMessage::JoinRequest { .. } => unreachable!("handled above"),
            ClientMessage::AuthResponse { password } => {
                self.server.receive_auth_response(id, &password);
            }
            ClientMessage::AssetInfoResponse { missing, hashes } => {
                self.server.receive_asset_info_response(id, &missing, &hashes);
            }
            ClientMessage::SpawnRequest => self.server.receive_spawn_request(id),
            ClientMessage::SpawnComplete => self.server.receive_spawn_complete(id),
            ClientMessage::InputPayload(cmd) => self.server.receive_input_payload(id, cmd),
            ClientMessage::EventPayload {
                target,
                input,
                parameter,
            } => {
                self.server
                    .receive_event_payload(id, &target, &input, parameter.as_deref());
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<HostEvent>) {
    static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        info!(token, %addr, "accepted connection");
        spawn_transport(stream, addr, token, events.clone());
    }
}

fn spawn_transport(
    stream: TcpStream,
    addr: SocketAddr,
    token: u64,
    events: mpsc::UnboundedSender<HostEvent>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    if events
        .send(HostEvent::Connected { token, addr, tx })
        .is_err()
    {
        return;
    }

    // Writer: bridge channel → frames.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &msg).await {
                debug!(token, error = %e, "writer stopped");
                break;
            }
        }
    });

    // Reader: frames → inbound queue. Decode failures are reported as
    // malformed traffic; everything else ends the session.
    tokio::spawn(async move {
        loop {
            match read_frame::<_, ClientMessage>(&mut reader).await {
                Ok(msg) => {
                    if events.send(HostEvent::Packet { token, msg }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    if e.downcast_ref::<serde_json::Error>().is_some() {
                        let _ = events.send(HostEvent::Malformed { token });
                    }
                    let _ = events.send(HostEvent::Closed { token });
                    break;
                }
            }
        }
    });
}
