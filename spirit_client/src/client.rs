//! Client implementation.
//!
//! The client maintains:
//! - A framed TCP connection to the relay, read by a background task
//! - Its own copy of the tile grid, seeded by `init`
//! - The local player, simulated here and never on the relay
//! - The latest state of every remote player

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use spirit_shared::{
    config::EngineConfig,
    grid::{Grid, GridMutation, TilePos},
    net::{
        decode_from_bytes, ClientMsg, FrameReader, FrameWriter, PlayerData, ReliableConn,
        ServerMsg,
    },
    physics::{self, InputIntent, PhysicsConfig, Player, Step},
    render::{render_scene, RenderBackend},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::remote::RemotePlayers;

/// How long `connect` waits for the relay's `init`.
const INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay messages buffered before the read task waits for `poll`.
const INBOUND_QUEUE: usize = 256;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Init received, exchanging updates.
    Connected,
    /// Relay closed the connection.
    Disconnected,
}

/// Networked game client.
pub struct GameClient {
    pub state: ClientState,
    pub physics: PhysicsConfig,
    pub grid: Grid,
    pub player: Player,
    pub remotes: RemotePlayers,
    /// Spawn tile assigned by the relay.
    pub spawn: TilePos,

    writer: FrameWriter,
    inbound: mpsc::Receiver<ServerMsg>,
    reader_task: JoinHandle<()>,
    tick: u64,
}

impl GameClient {
    /// Connects to the relay and waits for `init`.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        Self::connect_with(cfg, PhysicsConfig::default()).await
    }

    pub async fn connect_with(cfg: &EngineConfig, physics: PhysicsConfig) -> anyhow::Result<Self> {
        let relay_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(relay = %relay_addr, name = %cfg.player_name, "Connecting to relay");

        let mut conn = ReliableConn::connect(relay_addr).await?;
        let first: ServerMsg = tokio::time::timeout(INIT_TIMEOUT, conn.recv())
            .await
            .context("timed out waiting for init")??;
        let (grid, spawn) = grid_from_init(first)?;
        info!(
            width = grid.width(),
            height = grid.height(),
            spawn_x = spawn.x,
            spawn_y = spawn.y,
            "Received level"
        );

        let (reader, writer) = conn.into_split();
        let (tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let reader_task = tokio::spawn(read_loop(reader, tx));

        let player = Player::spawn(physics.spawn_position(spawn), &physics);
        Ok(Self {
            state: ClientState::Connected,
            physics,
            grid,
            player,
            remotes: RemotePlayers::new(),
            spawn,
            writer,
            inbound,
            reader_task,
            tick: 0,
        })
    }

    /// Runs one physics frame and publishes the result.
    ///
    /// A grid mutation from a mode transition is applied locally and sent
    /// as `spiritupd` before this frame's `playerdata`.
    pub async fn tick(&mut self, input: InputIntent, elapsed_ms: f32) -> anyhow::Result<Step> {
        let step = physics::update(&self.physics, &self.player, &self.grid, input, elapsed_ms);
        self.player = step.player.clone();

        if let Some(m) = step.mutation {
            self.grid.apply(m);
            self.writer.send(&ClientMsg::from_mutation(m)).await?;
            debug!(row = m.row, col = m.col, occupied = m.occupied, "Sent tile update");
        }
        self.writer
            .send(&ClientMsg::PlayerData(self.player_data()))
            .await?;
        self.tick += 1;
        Ok(step)
    }

    /// Current local player state as sent to the relay.
    pub fn player_data(&self) -> PlayerData {
        PlayerData {
            id: None,
            x: self.player.position.x,
            y: self.player.position.y,
            dx: self.player.velocity.x,
            is_ctrl: self.player.is_detached(),
            spirit_size: self.player.spirit_size,
            side_length: self.player.side_length,
        }
    }

    /// Applies every message received so far. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.inbound.try_recv() {
                Ok(msg) => {
                    self.handle_message(msg);
                    handled += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.mark_disconnected();
                    break;
                }
            }
        }
        handled
    }

    /// Waits up to `timeout` for the next message, applies it and returns it.
    pub async fn recv_message(&mut self, timeout: Duration) -> Option<ServerMsg> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(msg)) => {
                self.handle_message(msg.clone());
                Some(msg)
            }
            Ok(None) => {
                self.mark_disconnected();
                None
            }
            Err(_) => None,
        }
    }

    fn handle_message(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::BlockUpd { x, y, block } => {
                let applied = self.grid.apply(GridMutation {
                    row: y,
                    col: x,
                    occupied: block,
                });
                if !applied {
                    warn!(x, y, "Tile update outside the grid");
                }
            }
            ServerMsg::PlayerData(data) => {
                if !self.remotes.upsert(data) {
                    debug!("Dropped playerdata without id");
                }
            }
            ServerMsg::PlayerDisconnect { id } => {
                if self.remotes.remove(id) {
                    info!(conn_id = ?id, "Remote player left");
                }
            }
            ServerMsg::Init { .. } => match grid_from_init(msg) {
                Ok((grid, spawn)) => {
                    info!("Level replaced by relay");
                    self.grid = grid;
                    self.spawn = spawn;
                    self.respawn();
                }
                Err(e) => warn!(error = %e, "Ignored bad init"),
            },
        }
    }

    fn mark_disconnected(&mut self) {
        if self.state != ClientState::Disconnected {
            info!("Disconnected from relay");
            self.state = ClientState::Disconnected;
        }
    }

    /// Puts the local player back at its spawn tile.
    pub fn respawn(&mut self) {
        let pos = self.physics.spawn_position(self.spawn);
        self.player.respawn(pos, &self.physics);
    }

    /// Draws the current scene, with remote players smoothed between updates.
    pub fn render<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        let remotes = self.remotes.smoothed(Instant::now());
        render_scene(backend, &self.physics, &self.grid, remotes.iter(), &self.player);
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first().copied() {
            None => Vec::new(),
            Some("status") => vec![
                format!("State: {:?}", self.state),
                format!("Tick: {}", self.tick),
                format!("Grid: {}x{}", self.grid.width(), self.grid.height()),
                format!(
                    "Player: ({:.1}, {:.1}) {:?}",
                    self.player.position.x, self.player.position.y, self.player.spirit_state
                ),
                format!("Remote players: {}", self.remotes.len()),
            ],
            Some("respawn") => {
                self.respawn();
                vec!["Respawned".to_string()]
            }
            Some(other) => vec![format!("Unknown command: {other}")],
        }
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn grid_from_init(msg: ServerMsg) -> anyhow::Result<(Grid, TilePos)> {
    let (blocks, width, height, spawn_point) = match msg {
        ServerMsg::Init {
            blocks,
            width,
            height,
            spawn_point,
        } => (blocks, width, height, spawn_point),
        other => bail!("expected init, got {other:?}"),
    };
    let grid = Grid::from_cells(blocks, vec![spawn_point]).context("init blocks")?;
    if grid.width() != width || grid.height() != height {
        bail!(
            "init says {width}x{height}, blocks are {}x{}",
            grid.width(),
            grid.height()
        );
    }
    Ok((grid, spawn_point))
}

async fn read_loop(mut reader: FrameReader, tx: mpsc::Sender<ServerMsg>) {
    loop {
        let frame = match reader.recv_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Relay read ended");
                break;
            }
        };
        match decode_from_bytes::<ServerMsg>(&frame) {
            Ok(msg) => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Ignored malformed relay message"),
        }
    }
}
