//! Networking primitives.
//!
//! - Relay wire messages, one closed enum per direction, JSON with a `type` tag.
//! - A reliable TCP channel carrying length-prefixed frames.
//!
//! Frames are `u32` big-endian length followed by that many bytes of JSON.
//! Receivers get raw frames first so a relay can reject a bad payload without
//! dropping the connection.

use anyhow::{bail, Context};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::grid::{Grid, GridMutation, TilePos};

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Relay-assigned identifier of a connection. Small, dense, reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-tick player state shared with peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    /// Set by the relay when forwarding; ignored on the way in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ConnectionId>,
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    /// Whether the player is currently a detached spirit.
    pub is_ctrl: bool,
    pub spirit_size: f32,
    pub side_length: f32,
}

/// Client -> relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMsg {
    PlayerData(PlayerData),
    /// Tile toggle at tile coordinates.
    SpiritUpd { pos: TilePos, value: bool },
}

impl ClientMsg {
    pub fn from_mutation(m: GridMutation) -> Self {
        ClientMsg::SpiritUpd {
            pos: TilePos::new(m.col, m.row),
            value: m.occupied,
        }
    }
}

/// Relay -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMsg {
    Init {
        blocks: Vec<Vec<bool>>,
        width: usize,
        height: usize,
        #[serde(rename = "spawnPoint")]
        spawn_point: TilePos,
    },
    PlayerData(PlayerData),
    BlockUpd {
        x: i32,
        y: i32,
        block: bool,
    },
    PlayerDisconnect {
        id: ConnectionId,
    },
}

impl ServerMsg {
    pub fn init(grid: &Grid, spawn_point: TilePos) -> Self {
        ServerMsg::Init {
            blocks: grid.cells().to_vec(),
            width: grid.width(),
            height: grid.height(),
            spawn_point,
        }
    }

    pub fn block_update(m: GridMutation) -> Self {
        ServerMsg::BlockUpd {
            x: m.col,
            y: m.row,
            block: m.occupied,
        }
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        write_frame(&mut self.stream, &encode_to_bytes(msg)?).await
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        write_frame(&mut self.stream, payload).await
    }

    pub async fn recv_frame(&mut self) -> anyhow::Result<Bytes> {
        read_frame(&mut self.stream).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let frame = self.recv_frame().await?;
        decode_from_bytes(&frame)
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { half: read }, FrameWriter { half: write })
    }
}

/// Read half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv_frame(&mut self) -> anyhow::Result<Bytes> {
        read_frame(&mut self.half).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let frame = self.recv_frame().await?;
        decode_from_bytes(&frame)
    }
}

/// Write half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        write_frame(&mut self.half, &encode_to_bytes(msg)?).await
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        write_frame(&mut self.half, payload).await
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> anyhow::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds limit", payload.len());
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<Bytes> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("peer announced a {len} byte frame");
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Bytes::from(payload))
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}
