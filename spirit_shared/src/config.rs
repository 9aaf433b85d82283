//! Configuration system.
//!
//! Loads engine configuration from JSON strings/files.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root configuration shared by client/relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Relay listen/connect address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Client frame rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Level file served by the relay; the built-in level when absent.
    #[serde(default)]
    pub level_path: Option<String>,
    /// Player label (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_tick_hz() -> u32 {
    60
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: default_tick_hz(),
            level_path: None,
            player_name: default_player_name(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Frame length implied by `tick_hz`, in milliseconds.
    pub fn frame_ms(&self) -> f32 {
        1_000.0 / self.tick_hz.max(1) as f32
    }
}
