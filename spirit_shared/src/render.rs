//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! A display surface implements [`RenderBackend`]; [`render_scene`] walks the
//! grid and players in draw order.

use crate::{
    grid::Grid,
    math::Vec2,
    net::{ConnectionId, PlayerData},
    physics::{PhysicsConfig, Player},
};

/// What a backend needs to draw one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSprite {
    /// `None` for the local player.
    pub id: Option<ConnectionId>,
    pub center: Vec2,
    pub side_length: f32,
    /// Spirit size as a fraction of `side_length`.
    pub spirit_size: f32,
    /// Horizontal velocity, used to skew the body.
    pub dx: f32,
    pub detached: bool,
}

impl PlayerSprite {
    pub fn local(player: &Player) -> Self {
        Self {
            id: None,
            center: player.position,
            side_length: player.side_length,
            spirit_size: player.spirit_size,
            dx: player.velocity.x,
            detached: player.is_detached(),
        }
    }

    pub fn remote(data: &PlayerData) -> Self {
        Self {
            id: data.id,
            center: Vec2::new(data.x, data.y),
            side_length: data.side_length,
            spirit_size: data.spirit_size,
            dx: data.dx,
            detached: data.is_ctrl,
        }
    }
}

/// A minimal 2D rendering API.
pub trait RenderBackend: Send + Sync {
    fn begin_frame(&mut self);
    /// Draws an occupied tile given its top-left corner.
    fn draw_tile(&mut self, top_left: Vec2, size: f32);
    fn draw_player(&mut self, sprite: &PlayerSprite);
    fn end_frame(&mut self);
}

/// A no-op renderer useful for headless runs.
#[derive(Default)]
pub struct NullRenderer;

impl RenderBackend for NullRenderer {
    fn begin_frame(&mut self) {}
    fn draw_tile(&mut self, _top_left: Vec2, _size: f32) {}
    fn draw_player(&mut self, _sprite: &PlayerSprite) {}
    fn end_frame(&mut self) {}
}

/// Draws tiles, then remote players, then the local player on top.
pub fn render_scene<'a, B, I>(
    backend: &mut B,
    cfg: &PhysicsConfig,
    grid: &Grid,
    remotes: I,
    local: &Player,
) where
    B: RenderBackend + ?Sized,
    I: IntoIterator<Item = &'a PlayerData>,
{
    backend.begin_frame();
    for (row, col) in grid.occupied_tiles() {
        let top_left = Vec2::new(col as f32 * cfg.tile_size, row as f32 * cfg.tile_size);
        backend.draw_tile(top_left, cfg.tile_size);
    }
    for data in remotes {
        backend.draw_player(&PlayerSprite::remote(data));
    }
    backend.draw_player(&PlayerSprite::local(local));
    backend.end_frame();
}
