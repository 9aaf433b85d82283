//! Standalone relay binary.
//!
//! Usage:
//!   cargo run -p spirit_relay -- [--addr 127.0.0.1:40000] [--level level.lvl] [--config relay.json]
//!
//! Console commands:
//!   status  - Show grid and connection info
//!   quit    - Shutdown relay

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use spirit_relay::server::{load_grid, RelayServer};
use spirit_shared::config::EngineConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<EngineConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => EngineConfig::load(&args[i + 1])?,
        _ => EngineConfig::default(),
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--level" if i + 1 < args.len() => {
                cfg.level_path = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    let grid = load_grid(&cfg)?;
    info!(
        addr = %cfg.server_addr,
        width = grid.width(),
        height = grid.height(),
        spawns = grid.spawn_points().len(),
        "Starting relay"
    );

    let mut server = RelayServer::new(cfg, grid)
        .await
        .context("create relay")?;
    let local = server.local_addr()?;
    info!(%local, "Relay listening");

    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Relay ready. Type 'status' for info, 'quit' to exit.");
    println!();

    server.run().await
}
