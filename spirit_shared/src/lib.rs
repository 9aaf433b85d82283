//! `spirit_shared`
//!
//! Shared libraries used by both client and relay.
//!
//! Design goals:
//! - Deterministic physics with no I/O.
//! - Clear separation of concerns (grid, physics, net, config).
//! - Closed message types validated at the boundary.
//! - No `unsafe`.

pub mod config;
pub mod grid;
pub mod math;
pub mod net;
pub mod physics;
pub mod render;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::grid::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::physics::*;
}
