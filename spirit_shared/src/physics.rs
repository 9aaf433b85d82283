//! Player physics.
//!
//! Deterministic per-frame update for a single player moving through a tile
//! grid. Two movement modes:
//! - **Embodied**: gravity, saturating horizontal speed, coyote-time jumps.
//! - **Detached** (spirit): no gravity, omnidirectional movement, smaller
//!   collision box.
//!
//! Switching modes takes one frozen `Transitioning` tick that snaps the
//! player to the center of its tile and emits the only gameplay-driven
//! [`GridMutation`].
//!
//! Collision resolution scans occupied tiles in row-major order and resolves
//! each overlap against a single face, chosen by the steeper axis with ties
//! going to top/bottom. A face whose neighbor tile is also occupied is
//! skipped so seams between solid tiles never catch the player.
//!
//! Nothing here fails: odd inputs are clamped or saturated.

use crate::{
    grid::{Grid, GridMutation, TilePos},
    math::{saturate, Vec2},
};

bitflags::bitflags! {
    /// Player intent for one tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InputIntent: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const UP = 1 << 2;
        const DOWN = 1 << 3;
        const TOGGLE_SPIRIT = 1 << 4;
    }
}

impl Default for InputIntent {
    fn default() -> Self {
        InputIntent::empty()
    }
}

/// How spirit size relaxes toward its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiritEasing {
    /// `size += k * (target - size)` once per update, whatever the frame length.
    #[default]
    PerInvocation,
    /// Same law, compounded over the frame length measured in reference frames.
    TimeScaled,
}

/// Physics parameters. Speeds are in pixels per reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    /// Tile edge length in pixels.
    pub tile_size: f32,
    /// Reference frame length; velocities are integrated in units of it.
    pub frame_ms: f32,
    /// Longest frame the integrator accepts.
    pub max_frame_ms: f32,
    pub gravity: f32,
    /// Gravity multiplier while `DOWN` is held.
    pub fast_fall: f32,
    pub jump_impulse: f32,
    /// Asymptotic speed `a` of the saturating response curve.
    pub horizontal_speed: f32,
    pub horizontal_accel: f32,
    /// Horizontal speed below which an idle player stops.
    pub rest_snap: f32,
    pub max_rise_speed: f32,
    pub max_fall_speed: f32,
    pub spirit_speed: f32,
    /// Spirit size (fraction of side length) while embodied.
    pub embodied_spirit_size: f32,
    /// Spirit size while detached; also the lower bound of spirit size.
    pub detached_spirit_size: f32,
    /// Easing factor `k`.
    pub spirit_ease: f32,
    pub spirit_easing: SpiritEasing,
    /// Coyote-time allowance in ticks.
    pub jump_grace_ticks: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        let side = 20.0_f32;
        let area = side * side;
        Self {
            tile_size: side,
            frame_ms: 16.0,
            max_frame_ms: 1_000.0,
            gravity: area / 500.0,
            fast_fall: 2.0,
            jump_impulse: area / 40.0,
            horizontal_speed: 11.0,
            horizontal_accel: 4.0,
            rest_snap: 0.5,
            max_rise_speed: 2.0 * area / 50.0,
            max_fall_speed: side,
            spirit_speed: 6.0,
            embodied_spirit_size: 0.7,
            detached_spirit_size: 0.3,
            spirit_ease: 0.2,
            spirit_easing: SpiritEasing::PerInvocation,
            jump_grace_ticks: 4,
        }
    }
}

impl PhysicsConfig {
    /// Frame length in reference frames, clamped to `[0, max_frame_ms]`.
    pub fn frame_scale(&self, elapsed_ms: f32) -> f32 {
        if !elapsed_ms.is_finite() || elapsed_ms <= 0.0 {
            return 0.0;
        }
        elapsed_ms.min(self.max_frame_ms) / self.frame_ms
    }

    /// World-space center of a tile.
    pub fn tile_center(&self, row: i32, col: i32) -> Vec2 {
        Vec2::new(
            (col as f32 + 0.5) * self.tile_size,
            (row as f32 + 0.5) * self.tile_size,
        )
    }

    /// World-space center of a spawn tile.
    pub fn spawn_position(&self, spawn: TilePos) -> Vec2 {
        self.tile_center(spawn.y, spawn.x)
    }

    /// `(row, col)` of the tile containing `pos`, clamped into the grid.
    pub fn tile_of(&self, pos: Vec2, grid: &Grid) -> (i32, i32) {
        let clamp = |v: f32, len: usize| -> i32 {
            let max = len.saturating_sub(1) as i32;
            ((v / self.tile_size).floor() as i32).clamp(0, max)
        };
        (clamp(pos.y, grid.height()), clamp(pos.x, grid.width()))
    }

    pub fn world_size(&self, grid: &Grid) -> Vec2 {
        Vec2::new(
            grid.width() as f32 * self.tile_size,
            grid.height() as f32 * self.tile_size,
        )
    }
}

/// Movement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiritState {
    Embodied,
    /// One frozen tick on the way to the other mode.
    Transitioning { detaching: bool },
    Detached,
}

/// Kinematic state of the local player.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub position: Vec2,
    pub velocity: Vec2,
    pub side_length: f32,
    /// Spirit size as a fraction of `side_length`.
    pub spirit_size: f32,
    pub spirit_state: SpiritState,
    pub jump_grace: u32,
    /// Toggle intent seen on the previous tick; transitions fire on the rising edge.
    toggle_held: bool,
    /// Tile the spirit left and the state it had, written back on a same-tile return.
    vacated: Option<(i32, i32, bool)>,
}

impl Player {
    /// New embodied player at rest.
    pub fn spawn(position: Vec2, cfg: &PhysicsConfig) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            side_length: cfg.tile_size,
            spirit_size: cfg.embodied_spirit_size,
            spirit_state: SpiritState::Embodied,
            jump_grace: 0,
            toggle_held: false,
            vacated: None,
        }
    }

    /// Puts the player back at a spawn point without recreating it.
    pub fn respawn(&mut self, position: Vec2, cfg: &PhysicsConfig) {
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.spirit_size = cfg.embodied_spirit_size;
        self.spirit_state = SpiritState::Embodied;
        self.jump_grace = 0;
        self.vacated = None;
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.spirit_state, SpiritState::Detached)
    }

    /// Edge length of the current collision box.
    pub fn collision_size(&self) -> f32 {
        match self.spirit_state {
            SpiritState::Detached => self.spirit_size * self.side_length,
            _ => self.side_length,
        }
    }
}

/// Result of one physics update.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub player: Player,
    /// Tile change requested by a mode transition.
    pub mutation: Option<GridMutation>,
    /// Whether the player touched ground this tick.
    pub landed: bool,
}

/// Tile face struck during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Top,
    Bottom,
    Left,
    Right,
}

/// Advances the player by one frame.
pub fn update(
    cfg: &PhysicsConfig,
    player: &Player,
    grid: &Grid,
    input: InputIntent,
    elapsed_ms: f32,
) -> Step {
    let mut p = player.clone();
    let dt = cfg.frame_scale(elapsed_ms);

    let toggle = input.contains(InputIntent::TOGGLE_SPIRIT);
    let toggle_edge = toggle && !p.toggle_held;
    p.toggle_held = toggle;

    let mut mutation = None;
    let mut landed = false;

    let state = p.spirit_state;
    match state {
        SpiritState::Transitioning { detaching: true } => {
            p.spirit_state = SpiritState::Detached;
        }
        SpiritState::Transitioning { detaching: false } => {
            p.spirit_state = SpiritState::Embodied;
            // A body that filled its tile is pushed out onto a free face.
            let mut position = p.position;
            landed = resolve_collisions(cfg, grid, &mut position, &mut p.velocity, p.side_length);
            if landed {
                p.jump_grace = cfg.jump_grace_ticks;
            }
            p.position = position;
        }
        SpiritState::Embodied | SpiritState::Detached if toggle_edge => {
            mutation = Some(begin_transition(cfg, &mut p, grid));
        }
        SpiritState::Embodied => {
            landed = embodied_motion(cfg, &mut p, grid, input, dt);
        }
        SpiritState::Detached => {
            detached_motion(cfg, &mut p, grid, input, dt);
        }
    }

    ease_spirit(cfg, &mut p, dt);

    Step {
        player: p,
        mutation,
        landed,
    }
}

fn begin_transition(cfg: &PhysicsConfig, p: &mut Player, grid: &Grid) -> GridMutation {
    let (row, col) = cfg.tile_of(p.position, grid);
    p.velocity = Vec2::ZERO;
    p.position = cfg.tile_center(row, col);

    let detaching = matches!(p.spirit_state, SpiritState::Embodied);
    let occupied = if detaching {
        p.vacated = Some((row, col, grid.is_occupied(row, col)));
        false
    } else {
        // Returning to the vacated tile restores it; any other tile is filled.
        match p.vacated.take() {
            Some((r, c, prior)) if (r, c) == (row, col) => prior,
            _ => true,
        }
    };
    p.spirit_state = SpiritState::Transitioning { detaching };

    tracing::debug!(row, col, detaching, occupied, "Spirit transition");
    GridMutation { row, col, occupied }
}

fn embodied_motion(
    cfg: &PhysicsConfig,
    p: &mut Player,
    grid: &Grid,
    input: InputIntent,
    dt: f32,
) -> bool {
    // Grace counts ticks that advance time.
    if dt > 0.0 {
        p.jump_grace = p.jump_grace.saturating_sub(1);
    }

    let mut landed = false;
    for step in sub_steps(dt) {
        landed |= embodied_step(cfg, p, grid, input, step);
    }
    if landed {
        p.jump_grace = cfg.jump_grace_ticks;
    }

    if input.contains(InputIntent::UP) && p.jump_grace > 0 {
        p.velocity.y = -cfg.jump_impulse;
        p.jump_grace = 0;
    }
    landed
}

/// Splits a frame scale into equal steps of at most one reference frame, so
/// no single move outruns a tile.
fn sub_steps(dt: f32) -> impl Iterator<Item = f32> {
    let count = dt.ceil().max(1.0) as u32;
    let step = dt / count as f32;
    (0..count).map(move |_| step)
}

fn embodied_step(
    cfg: &PhysicsConfig,
    p: &mut Player,
    grid: &Grid,
    input: InputIntent,
    dt: f32,
) -> bool {
    let left = input.contains(InputIntent::LEFT);
    let right = input.contains(InputIntent::RIGHT);
    match (left, right) {
        (true, false) => p.velocity.x -= cfg.horizontal_accel * dt,
        (false, true) => p.velocity.x += cfg.horizontal_accel * dt,
        _ if p.velocity.x.abs() < cfg.rest_snap => p.velocity.x = 0.0,
        _ => {}
    }
    p.velocity.x = saturate(p.velocity.x, cfg.horizontal_speed);

    let gravity = if input.contains(InputIntent::DOWN) {
        cfg.gravity * cfg.fast_fall
    } else {
        cfg.gravity
    };
    p.velocity.y = (p.velocity.y + gravity * dt).clamp(-cfg.max_rise_speed, cfg.max_fall_speed);

    let mut candidate = p.position + p.velocity.scale(dt);
    let landed = resolve_collisions(cfg, grid, &mut candidate, &mut p.velocity, p.side_length);
    p.position = candidate;
    landed
}

fn detached_motion(cfg: &PhysicsConfig, p: &mut Player, grid: &Grid, input: InputIntent, dt: f32) {
    let axis = |neg: InputIntent, pos: InputIntent| -> f32 {
        input.contains(pos) as i8 as f32 - input.contains(neg) as i8 as f32
    };
    let dir = Vec2::new(
        axis(InputIntent::LEFT, InputIntent::RIGHT),
        axis(InputIntent::UP, InputIntent::DOWN),
    )
    .normalized();

    p.velocity = dir.scale(saturate(cfg.spirit_speed, cfg.horizontal_speed));
    let size = p.collision_size();
    for step in sub_steps(dt) {
        let mut candidate = p.position + p.velocity.scale(step);
        resolve_collisions(cfg, grid, &mut candidate, &mut p.velocity, size);
        p.position = candidate;
    }
}

fn ease_spirit(cfg: &PhysicsConfig, p: &mut Player, dt: f32) {
    let target = match p.spirit_state {
        SpiritState::Embodied | SpiritState::Transitioning { detaching: false } => {
            cfg.embodied_spirit_size
        }
        SpiritState::Detached | SpiritState::Transitioning { detaching: true } => {
            cfg.detached_spirit_size
        }
    };
    let k = match cfg.spirit_easing {
        SpiritEasing::PerInvocation => cfg.spirit_ease,
        SpiritEasing::TimeScaled => 1.0 - (1.0 - cfg.spirit_ease).powf(dt),
    };
    p.spirit_size += k * (target - p.spirit_size);
    p.spirit_size = p.spirit_size.clamp(cfg.detached_spirit_size, 1.0);
}

/// Clamps `candidate` into the world and out of occupied tiles.
///
/// Returns true when the player came to rest on the bottom border or on top
/// of a tile.
fn resolve_collisions(
    cfg: &PhysicsConfig,
    grid: &Grid,
    candidate: &mut Vec2,
    velocity: &mut Vec2,
    size: f32,
) -> bool {
    let half = size / 2.0;
    let world = cfg.world_size(grid);
    let mut landed = false;

    if candidate.x < half {
        candidate.x = half;
        velocity.x = velocity.x.max(0.0);
    } else if candidate.x > world.x - half {
        candidate.x = world.x - half;
        velocity.x = velocity.x.min(0.0);
    }

    if candidate.y < half {
        candidate.y = half;
        velocity.y = velocity.y.max(0.0);
    } else if candidate.y > world.y - half {
        candidate.y = world.y - half;
        velocity.y = velocity.y.min(0.0);
        landed = true;
    }

    let reach = (cfg.tile_size + size) / 2.0;
    for (row, col) in grid.occupied_tiles() {
        let center = cfg.tile_center(row, col);
        let dist_x = candidate.x - center.x;
        let dist_y = candidate.y - center.y;
        if dist_x.abs() >= reach || dist_y.abs() >= reach {
            continue;
        }

        let face = if -dist_y >= dist_x.abs() {
            Face::Top
        } else if dist_y >= dist_x.abs() {
            Face::Bottom
        } else if dist_x < 0.0 {
            Face::Left
        } else {
            Face::Right
        };

        let (n_row, n_col) = match face {
            Face::Top => (row - 1, col),
            Face::Bottom => (row + 1, col),
            Face::Left => (row, col - 1),
            Face::Right => (row, col + 1),
        };
        if grid.is_occupied(n_row, n_col) {
            continue;
        }

        match face {
            Face::Top => {
                candidate.y = center.y - reach;
                velocity.y = velocity.y.min(0.0);
                landed = true;
            }
            Face::Bottom => {
                candidate.y = center.y + reach;
                velocity.y = velocity.y.max(0.0);
            }
            Face::Left => {
                candidate.x = center.x - reach;
                velocity.x = velocity.x.min(0.0);
            }
            Face::Right => {
                candidate.x = center.x + reach;
                velocity.x = velocity.x.max(0.0);
            }
        }
    }

    // Tile pushes may leave the world; keep the border invariant.
    candidate.x = candidate.x.clamp(half, (world.x - half).max(half));
    candidate.y = candidate.y.clamp(half, (world.y - half).max(half));
    landed
}
