//! Shared helpers for the socket-level tests.

use std::time::Duration;

use anyhow::Context;
use spirit_relay::server::bind_ephemeral;
use spirit_shared::{
    config::EngineConfig,
    grid::Grid,
    net::{ReliableConn, ServerMsg},
};
use tokio::task::JoinHandle;

/// Level used by the integration tests: two spawn tiles on a floor.
pub const TEST_LEVEL: &str = "{\"width\":6,\"height\":4}\n......\n.P..P.\n..##..\n######\n";

/// How long a test waits for one relay message.
pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Starts a relay on an ephemeral port serving [`TEST_LEVEL`].
pub async fn spawn_relay() -> anyhow::Result<(JoinHandle<anyhow::Result<()>>, EngineConfig)> {
    let grid = Grid::from_level_str(TEST_LEVEL)?;
    let (server, cfg) = bind_ephemeral(grid).await?;
    Ok((tokio::spawn(server.run()), cfg))
}

/// Opens a bare framed connection, bypassing the game client.
pub async fn raw_connect(cfg: &EngineConfig) -> anyhow::Result<ReliableConn> {
    ReliableConn::connect(cfg.server_addr.parse()?).await
}

/// Receives one message from a bare connection within [`WAIT`].
pub async fn recv_within(conn: &mut ReliableConn) -> anyhow::Result<ServerMsg> {
    tokio::time::timeout(WAIT, conn.recv())
        .await
        .context("timed out waiting for relay")?
}
