//! Tile grid.
//!
//! A fixed-size 2D array of occupied/empty tiles plus the level's spawn points.
//! Cells are indexed `[row][col]`. Reads outside the grid return "empty" so
//! neighbor lookups at the edge need no special casing.
//!
//! Level text format:
//! ```text
//! {"width":4,"height":2}
//! #..P
//! ####
//! ```
//! `#` is an occupied tile, `P` a spawn point on an empty tile, anything else
//! is empty.

use anyhow::{bail, Context};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

/// Tile coordinates: `x` is the column, `y` is the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Metadata line at the top of a level file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LevelMeta {
    width: usize,
    height: usize,
}

/// Mutable-content, fixed-shape tile grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Vec<bool>>,
    spawn_points: Vec<TilePos>,
}

impl Grid {
    /// Creates an all-empty grid with no spawn points.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![vec![false; width]; height],
            spawn_points: Vec::new(),
        }
    }

    /// Builds a grid from row-major cells. Every row must be `width` long.
    pub fn from_cells(cells: Vec<Vec<bool>>, spawn_points: Vec<TilePos>) -> anyhow::Result<Self> {
        let height = cells.len();
        let width = cells.first().map_or(0, Vec::len);
        if let Some((row, bad)) = cells.iter().enumerate().find(|(_, r)| r.len() != width) {
            bail!("row {row} has {} cells, expected {width}", bad.len());
        }
        Ok(Self {
            width,
            height,
            cells,
            spawn_points,
        })
    }

    /// Parses a level description.
    pub fn from_level_str(src: &str) -> anyhow::Result<Self> {
        let mut lines = src.lines();
        let meta_line = lines.next().context("level is empty")?;
        let meta: LevelMeta =
            serde_json::from_str(meta_line.trim()).context("parse level metadata")?;

        let rows: Vec<&str> = lines
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .collect();
        if rows.len() != meta.height {
            bail!("level has {} rows, metadata says {}", rows.len(), meta.height);
        }

        let mut cells = Vec::with_capacity(meta.height);
        let mut spawn_points = Vec::new();
        for (row, line) in rows.iter().enumerate() {
            let chars: Vec<char> = line.chars().collect();
            if chars.len() != meta.width {
                bail!(
                    "level row {row} has {} columns, metadata says {}",
                    chars.len(),
                    meta.width
                );
            }
            let mut cell_row = Vec::with_capacity(meta.width);
            for (col, ch) in chars.into_iter().enumerate() {
                if ch == 'P' {
                    spawn_points.push(TilePos::new(col as i32, row as i32));
                }
                cell_row.push(ch == '#');
            }
            cells.push(cell_row);
        }

        Ok(Self {
            width: meta.width,
            height: meta.height,
            cells,
            spawn_points,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[Vec<bool>] {
        &self.cells
    }

    pub fn spawn_points(&self) -> &[TilePos] {
        &self.spawn_points
    }

    pub fn in_bounds(&self, row: i32, col: i32) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    /// Whether the tile is occupied. Out-of-bounds reads are empty.
    pub fn is_occupied(&self, row: i32, col: i32) -> bool {
        self.in_bounds(row, col) && self.cells[row as usize][col as usize]
    }

    /// Sets a tile. Returns false (and changes nothing) when out of bounds.
    pub fn set(&mut self, row: i32, col: i32, occupied: bool) -> bool {
        if !self.in_bounds(row, col) {
            return false;
        }
        self.cells[row as usize][col as usize] = occupied;
        true
    }

    /// Applies a mutation produced by physics or received from the relay.
    pub fn apply(&mut self, mutation: GridMutation) -> bool {
        self.set(mutation.row, mutation.col, mutation.occupied)
    }

    /// Occupied tiles in row-major scan order.
    pub fn occupied_tiles(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cells.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, occupied)| **occupied)
                .map(move |(col, _)| (row as i32, col as i32))
        })
    }

    /// Picks one spawn point uniformly at random, falling back to tile (0, 0).
    pub fn random_spawn<R: Rng + ?Sized>(&self, rng: &mut R) -> TilePos {
        self.spawn_points
            .choose(rng)
            .copied()
            .unwrap_or_default()
    }
}

/// Request to set one tile's occupied state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMutation {
    pub row: i32,
    pub col: i32,
    pub occupied: bool,
}
