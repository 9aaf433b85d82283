//! Relay server.
//!
//! One event-loop task owns the [`Relay`]; per-connection tasks only move
//! frames. Reader tasks forward raw frames as [`RelayEvent`]s, and each
//! connection has a writer task draining its bounded outbound queue. Since the
//! loop handles one event at a time, grid reads and writes never
//! interleave.
//!
//! Console commands:
//!   status  - Show grid and connection info
//!   quit    - Shutdown relay

use anyhow::Context;
use bytes::Bytes;
use spirit_shared::{
    config::EngineConfig,
    grid::Grid,
    net::{ConnectionId, ReliableConn, ReliableListener, ServerMsg},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::registry::OUTBOUND_QUEUE;
use crate::relay::{ConnectionPhase, Relay, RelayOutcome};

/// Level served when no level file is configured.
pub const DEFAULT_LEVEL: &str = include_str!("../levels/default.lvl");

/// Connection events fed to the relay loop.
#[derive(Debug)]
pub enum RelayEvent {
    Opened {
        peer: SocketAddr,
        sink: mpsc::Sender<ServerMsg>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Frame {
        id: ConnectionId,
        payload: Bytes,
    },
    Closed {
        id: ConnectionId,
    },
}

/// Loads the configured level, or the built-in one.
pub fn load_grid(cfg: &EngineConfig) -> anyhow::Result<Grid> {
    match &cfg.level_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("read level {path}"))?;
            Grid::from_level_str(&text).with_context(|| format!("parse level {path}"))
        }
        None => Grid::from_level_str(DEFAULT_LEVEL).context("parse built-in level"),
    }
}

/// Relay server bound to a listening socket.
pub struct RelayServer {
    pub cfg: EngineConfig,
    listener: ReliableListener,
    relay: Relay,
    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl RelayServer {
    /// Binds `cfg.server_addr` and serves `grid`.
    pub async fn new(cfg: EngineConfig, grid: Grid) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        Ok(Self {
            cfg,
            listener,
            relay: Relay::new(grid),
            console_rx: None,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Serves connections until `quit` arrives on the console.
    pub async fn run(self) -> anyhow::Result<()> {
        let RelayServer {
            listener,
            mut relay,
            mut console_rx,
            ..
        } = self;
        let (events_tx, mut events_rx) = mpsc::channel::<RelayEvent>(256);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((conn, peer)) => {
                        tokio::spawn(serve_connection(conn, peer, events_tx.clone()));
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                Some(event) = events_rx.recv() => handle_event(&mut relay, event),
                line = next_console_line(&mut console_rx) => match line {
                    Some(line) => {
                        if matches!(line.trim(), "quit" | "exit") {
                            info!("Relay shutting down");
                            return Ok(());
                        }
                        for out in relay.exec_console(&line) {
                            println!("{out}");
                        }
                    }
                    None => console_rx = None,
                },
            }
        }
    }
}

async fn next_console_line(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn handle_event(relay: &mut Relay, event: RelayEvent) {
    match event {
        RelayEvent::Opened { peer, sink, reply } => {
            let id = relay.on_open(Box::new(sink));
            debug!(conn_id = ?id, %peer, "Assigned connection id");
            if reply.send(id).is_err() {
                // Connection task went away before it learned its id.
                relay.on_close(id);
            }
        }
        RelayEvent::Frame { id, payload } => {
            if let RelayOutcome::Rejected { reason } = relay.on_message(id, &payload) {
                debug!(conn_id = ?id, %reason, "Frame dropped");
            }
        }
        RelayEvent::Closed { id } => {
            relay.on_close(id);
        }
    }
}

async fn serve_connection(conn: ReliableConn, peer: SocketAddr, events: mpsc::Sender<RelayEvent>) {
    let mut phase = ConnectionPhase::Connecting;
    debug!(%peer, ?phase, "Connection accepted");

    let (mut reader, mut writer) = conn.into_split();
    let (sink, mut outbound) = mpsc::channel::<ServerMsg>(OUTBOUND_QUEUE);
    let (reply, assigned) = oneshot::channel();
    if events
        .send(RelayEvent::Opened { peer, sink, reply })
        .await
        .is_err()
    {
        return;
    }
    let Ok(id) = assigned.await else {
        return;
    };
    phase = ConnectionPhase::Open;
    debug!(conn_id = ?id, %peer, ?phase, "Connection open");

    // Ends once the relay drops the sender on close.
    tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = writer.send(&msg).await {
                debug!(conn_id = ?id, error = %e, "Write failed");
                break;
            }
        }
    });

    loop {
        match reader.recv_frame().await {
            Ok(payload) => {
                if events.send(RelayEvent::Frame { id, payload }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(conn_id = ?id, error = %e, "Read ended");
                break;
            }
        }
    }

    phase = ConnectionPhase::Closed;
    debug!(conn_id = ?id, %peer, ?phase, "Connection finished");
    if events.send(RelayEvent::Closed { id }).await.is_err() {
        debug!(conn_id = ?id, "Relay loop gone before close was reported");
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(grid: Grid) -> anyhow::Result<(RelayServer, EngineConfig)> {
    let mut cfg = EngineConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..Default::default()
    };
    let server = RelayServer::new(cfg.clone(), grid).await?;
    cfg.server_addr = server.local_addr()?.to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_level_parses() {
        let grid = load_grid(&EngineConfig::default()).unwrap();
        assert!(grid.width() > 0 && grid.height() > 0);
        assert!(!grid.spawn_points().is_empty());
        assert!(grid.occupied_tiles().next().is_some());
    }

    #[test]
    fn missing_level_file_is_an_error() {
        let cfg = EngineConfig {
            level_path: Some("/nonexistent/level.lvl".to_string()),
            ..Default::default()
        };
        let err = load_grid(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("read level"));
    }

    #[tokio::test]
    async fn ephemeral_bind_reports_real_port() -> anyhow::Result<()> {
        let (server, cfg) = bind_ephemeral(Grid::new(2, 2)).await?;
        assert_eq!(cfg.server_addr, server.local_addr()?.to_string());
        assert_ne!(server.local_addr()?.port(), 0);
        assert_eq!(server.relay().open_connections(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn connection_task_ends_when_relay_loop_is_gone() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;
        let (accepted, client) = tokio::join!(listener.accept(), ReliableConn::connect(addr));
        let (conn, peer) = accepted?;
        let client = client?;

        let (events, mut relay_side) = mpsc::channel(8);
        let task = tokio::spawn(serve_connection(conn, peer, events));
        let Some(RelayEvent::Opened { reply, .. }) = relay_side.recv().await else {
            panic!("expected an open event");
        };
        reply
            .send(ConnectionId(0))
            .map_err(|_| anyhow::anyhow!("connection task stopped early"))?;

        drop(relay_side);
        drop(client);
        tokio::time::timeout(std::time::Duration::from_secs(2), task).await??;
        Ok(())
    }
}
