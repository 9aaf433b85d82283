//! `spirit_client`
//!
//! Client-side systems:
//! - Relay connection and message handling
//! - Keyboard state to movement intent
//! - Local physics, run every frame
//! - Remote player tracking with interpolation

pub mod client;
pub mod input;
pub mod remote;

pub use client::GameClient;
