//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p spirit_client -- [--addr 127.0.0.1:40000] [--tick-hz 60] [--name Player] [--config client.json]
//!
//! Runs headless: keys are pressed and released from the console, the scene
//! goes to a null renderer.
//!
//! Console commands:
//!   press <key>    - Hold a key (a, d, w, space, s, shift)
//!   release <key>  - Release a key
//!   status         - Show client status
//!   respawn        - Return to the spawn tile
//!   quit           - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use spirit_client::client::{ClientState, GameClient};
use spirit_client::input::KeyState;
use spirit_shared::{config::EngineConfig, render::NullRenderer};
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
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(60);
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
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
    info!(relay = %cfg.server_addr, tick_hz = cfg.tick_hz, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
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

    println!("Client connected. Type 'press <key>', 'status' for info, 'quit' to exit.");
    println!();

    let mut keys = KeyState::default();
    let mut renderer = NullRenderer;
    let frame = Duration::from_secs_f32(cfg.frame_ms() / 1_000.0);
    let mut last = tokio::time::Instant::now();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                ["quit" | "exit"] => return Ok(()),
                ["press", key] | ["release", key] => {
                    if !keys.set_key(key, tokens[0] == "press") {
                        println!("Unknown key: {key}");
                    }
                }
                _ => {
                    for out in client.exec_console(&line) {
                        println!("{out}");
                    }
                }
            }
        }

        client.poll();
        if client.state == ClientState::Disconnected {
            println!("Disconnected from relay.");
            break;
        }

        let now = tokio::time::Instant::now();
        let elapsed_ms = now.duration_since(last).as_secs_f32() * 1_000.0;
        last = now;
        client.tick(keys.intent(), elapsed_ms).await?;
        client.render(&mut renderer);

        tokio::time::sleep(frame).await;
    }

    Ok(())
}
