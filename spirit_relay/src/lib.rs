//! `spirit_relay`
//!
//! Relay for the spirit platformer:
//! - Connection registry with dense, reusable ids
//! - Protocol handler owning the shared tile grid
//! - TCP server loop with per-connection reader/writer tasks
//!
//! The relay runs no physics. It applies tile updates as received and
//! forwards player state to everyone but the sender.

pub mod registry;
pub mod relay;
pub mod server;

pub use relay::{Relay, RelayOutcome};
pub use server::RelayServer;
