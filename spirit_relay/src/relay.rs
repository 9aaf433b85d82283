//! Relay protocol handler.
//!
//! Owns the shared [`Grid`] and the [`ConnectionRegistry`]. Every inbound
//! connection event runs to completion here before the next one, so grid
//! reads and writes never interleave.
//!
//! Mutations are applied without ownership or plausibility checks: any
//! connected peer may change any cell.

use rand::{rngs::StdRng, SeedableRng};
use spirit_shared::{
    grid::{Grid, GridMutation},
    net::{decode_from_bytes, ClientMsg, ConnectionId, ServerMsg},
};
use tracing::{debug, info, warn};

use crate::registry::{ConnectionRegistry, MessageSink};

/// Lifecycle of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closed,
}

/// What the relay did with one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// `playerdata` forwarded to `delivered` peers.
    PlayerRelayed { delivered: usize },
    /// Tile written and announced to `delivered` peers.
    TileChanged {
        mutation: GridMutation,
        delivered: usize,
    },
    /// Frame discarded; nothing changed.
    Rejected { reason: String },
    /// Sender is not an open connection.
    Ignored,
}

/// Shared state of one relay session.
pub struct Relay {
    grid: Grid,
    registry: ConnectionRegistry,
    rng: StdRng,
}

impl Relay {
    pub fn new(grid: Grid) -> Self {
        Self::with_rng(grid, StdRng::from_entropy())
    }

    /// Deterministic spawn selection, for tests.
    pub fn with_seed(grid: Grid, seed: u64) -> Self {
        Self::with_rng(grid, StdRng::seed_from_u64(seed))
    }

    fn with_rng(grid: Grid, rng: StdRng) -> Self {
        Self {
            grid,
            registry: ConnectionRegistry::new(),
            rng,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn open_connections(&self) -> usize {
        self.registry.open_count()
    }

    /// Registers a connection and sends it the `init` message.
    pub fn on_open(&mut self, sink: Box<dyn MessageSink>) -> ConnectionId {
        let id = self.registry.accept(sink);
        let spawn = self.grid.random_spawn(&mut self.rng);
        if let Err(e) = self.registry.send(id, &ServerMsg::init(&self.grid, spawn)) {
            warn!(conn_id = ?id, error = %e, "Failed to send init");
        }
        info!(conn_id = ?id, spawn_x = spawn.x, spawn_y = spawn.y, open = self.open_connections(), "Connection registered");
        id
    }

    /// Handles one raw frame from `id`.
    pub fn on_message(&mut self, id: ConnectionId, payload: &[u8]) -> RelayOutcome {
        if !self.registry.is_open(id) {
            debug!(conn_id = ?id, "Frame from connection that is not open");
            return RelayOutcome::Ignored;
        }

        let msg = match decode_from_bytes::<ClientMsg>(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(conn_id = ?id, error = %e, len = payload.len(), "Rejected malformed message");
                return RelayOutcome::Rejected {
                    reason: format!("{e:#}"),
                };
            }
        };

        match msg {
            ClientMsg::PlayerData(mut data) => {
                data.id = Some(id);
                let delivered = self
                    .registry
                    .broadcast_except(id, &ServerMsg::PlayerData(data));
                RelayOutcome::PlayerRelayed { delivered }
            }
            ClientMsg::SpiritUpd { pos, value } => {
                let mutation = GridMutation {
                    row: pos.y,
                    col: pos.x,
                    occupied: value,
                };
                if !self.grid.apply(mutation) {
                    warn!(conn_id = ?id, x = pos.x, y = pos.y, "Rejected tile update outside the grid");
                    return RelayOutcome::Rejected {
                        reason: format!("tile ({}, {}) is outside the grid", pos.x, pos.y),
                    };
                }
                let delivered = self
                    .registry
                    .broadcast_except(id, &ServerMsg::block_update(mutation));
                debug!(conn_id = ?id, x = pos.x, y = pos.y, value, delivered, "Tile updated");
                RelayOutcome::TileChanged {
                    mutation,
                    delivered,
                }
            }
        }
    }

    /// Marks `id` closed and tells the remaining peers.
    pub fn on_close(&mut self, id: ConnectionId) -> bool {
        if !self.registry.close(id) {
            return false;
        }
        let delivered = self
            .registry
            .broadcast_except(id, &ServerMsg::PlayerDisconnect { id });
        info!(conn_id = ?id, notified = delivered, "Connection closed");
        true
    }

    /// Executes a console command and returns its output.
    pub fn exec_console(&self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first().copied() {
            None => Vec::new(),
            Some("status") => {
                let mut out = vec![
                    format!("Grid: {}x{}", self.grid.width(), self.grid.height()),
                    format!("Spawn points: {}", self.grid.spawn_points().len()),
                    format!(
                        "Connections: {} open, {} slots",
                        self.open_connections(),
                        self.registry.slots()
                    ),
                ];
                out.extend(self.registry.open_ids().map(|id| format!("  #{}", id.0)));
                out
            }
            Some(other) => vec![format!("Unknown command: {other}")],
        }
    }
}
