//! Wire protocol.
//!
//! Goals:
//! - One message enum per direction, mapped 1:1 to server handlers.
//! - Keep serialization explicit and versionable.
//! - Length-prefixed frames over TCP; the server core itself never touches
//!   sockets, only the transport edge does.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::assets::{AssetId, PrecacheManifest};
use crate::commands::ClientCommands;
use crate::math::{Angles, Vec3};
use crate::world::EntityId;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Identifies a connection slot on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

/// Client → server packets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    /// First packet of the handshake.
    JoinRequest { protocol: u32, name: String },
    /// Answer to `AuthRequest`.
    AuthResponse { password: String },
    /// Answer to `AssetInfoRequest`: ids the client could not resolve,
    /// plus its hash of each resolved asset.
    AssetInfoResponse {
        missing: Vec<AssetId>,
        hashes: Vec<(AssetId, u64)>,
    },
    /// Client asks to be placed into the world.
    SpawnRequest,
    /// Client finished local spawn; server may start accepting input.
    SpawnComplete,
    /// Per-tick input.
    InputPayload(ClientCommands),
    /// Scripted event addressed at a named entity input.
    EventPayload {
        target: String,
        input: String,
        parameter: Option<String>,
    },
}

/// Server → client packets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMessage {
    /// Server wants credentials.
    AuthRequest,
    /// Precache manifest the client must satisfy.
    AssetInfoRequest(PrecacheManifest),
    /// Asset payload step. Streaming is unimplemented; this is an empty
    /// acknowledgement that the client may proceed to spawn.
    AssetPayload { total_bytes: u64 },
    /// The client's entity has been created.
    SpawnResponse {
        client_id: ClientId,
        entity: EntityId,
    },
    /// Acknowledges `SpawnComplete`; the session is live.
    SpawnCompleteAck,
    /// Periodic world state.
    GameStatePayload(GameState),
    /// One-off world event (effects, sounds).
    GameEventPayload { name: String, origin: Option<Vec3> },
    /// Connection closed with a reason.
    Disconnect { reason: String },
}

/// Replicated state of one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityStateEntry {
    pub id: EntityId,
    pub position: Vec3,
    pub angles: Angles,
}

/// Full world snapshot pushed on the snapshot tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GameState {
    pub tick: u64,
    pub entities: Vec<EntityStateEntry>,
}

/// Convenience codec helpers.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    writer.write_all(&buf).await.context("frame write")?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub async fn read_frame<R, T>(reader: &mut R) -> anyhow::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .context("frame read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("frame read payload")?;
    decode_from_bytes(&payload)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct FramedConn {
    stream: TcpStream,
}

impl FramedConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_roundtrip_bytes() {
        let msg = ClientMessage::JoinRequest {
            protocol: PROTOCOL_VERSION,
            name: "Player".to_string(),
        };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back: ClientMessage = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn disconnect_reason_survives() {
        let msg = ServerMessage::Disconnect {
            reason: "missing 2 required asset(s)".to_string(),
        };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back: ServerMessage = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[tokio::test]
    async fn frames_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let msg = ClientMessage::SpawnRequest;
        write_frame(&mut a, &msg).await.unwrap();
        let back: ClientMessage = read_frame(&mut b).await.unwrap();
        assert_eq!(msg, back);
    }
}
