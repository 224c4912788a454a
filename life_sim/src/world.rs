//! The full simulated grid shared by every connection.
//!
//! Coordinates are signed so callers can address cells outside the grid;
//! the world's [`EdgeMode`] decides what such an address means.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::Deserialize;

/// State of a single cell.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Cell {
    #[default]
    Dead = 0,
    Alive = 1,
}

impl Cell {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Any non-zero value is treated as alive.
    pub fn from_u8(value: u8) -> Self {
        if value == 0 {
            Self::Dead
        } else {
            Self::Alive
        }
    }

    pub fn is_alive(self) -> bool {
        self == Self::Alive
    }
}

/// How coordinates outside `[0, H) x [0, W)` are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// Toroidal: out-of-range coordinates address the opposite edge.
    #[default]
    Wrap,
    /// Hard edges: everything outside the grid reads dead and ignores writes.
    Bounded,
}

impl EdgeMode {
    /// Map a signed coordinate pair onto a flat index, if it addresses a cell.
    #[inline]
    pub fn resolve(self, row: i64, col: i64, height: usize, width: usize) -> Option<usize> {
        let (h, w) = (height as i64, width as i64);
        let (r, c) = match self {
            Self::Wrap => (row.rem_euclid(h), col.rem_euclid(w)),
            Self::Bounded => {
                if !(0..h).contains(&row) || !(0..w).contains(&col) {
                    return None;
                }
                (row, col)
            }
        };
        Some(r as usize * width + c as usize)
    }
}

impl fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wrap => write!(f, "wrap"),
            Self::Bounded => write!(f, "bounded"),
        }
    }
}

impl FromStr for EdgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wrap" | "toroidal" => Ok(Self::Wrap),
            "bounded" => Ok(Self::Bounded),
            other => Err(format!("unknown edge mode '{other}'")),
        }
    }
}

/// Dense `height x width` grid of cells. Dimensions are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    height: usize,
    width: usize,
    edge_mode: EdgeMode,
    cells: Vec<Cell>,
}

impl World {
    /// Create an all-dead world. Zero dimensions are bumped to one.
    pub fn new(height: usize, width: usize, edge_mode: EdgeMode) -> Self {
        let height = height.max(1);
        let width = width.max(1);
        Self {
            height,
            width,
            edge_mode,
            cells: vec![Cell::Dead; height * width],
        }
    }

    /// Build a world from a row-major 0/1 matrix. Short rows are padded dead.
    pub fn from_rows(rows: &[Vec<u8>], edge_mode: EdgeMode) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut world = Self::new(rows.len(), width, edge_mode);
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                world.cells[r * world.width + c] = Cell::from_u8(value);
            }
        }
        world
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn get(&self, row: i64, col: i64) -> Cell {
        self.edge_mode
            .resolve(row, col, self.height, self.width)
            .map(|idx| self.cells[idx])
            .unwrap_or(Cell::Dead)
    }

    #[inline]
    pub fn set(&mut self, row: i64, col: i64, value: Cell) {
        if let Some(idx) = self.edge_mode.resolve(row, col, self.height, self.width) {
            self.cells[idx] = value;
        }
    }

    /// Set every cell alive independently with probability `p`.
    ///
    /// `p` is clamped to `[0, 1]`; `1.0` yields an all-alive world.
    pub fn randomize<R: Rng>(&mut self, p: f64, rng: &mut R) {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        for cell in &mut self.cells {
            *cell = if rng.gen_bool(p) {
                Cell::Alive
            } else {
                Cell::Dead
            };
        }
    }

    /// Advance the entire world one generation, using the world's own edge
    /// policy for neighbors.
    pub fn step_all(&mut self) {
        let mut next = vec![Cell::Dead; self.cells.len()];
        for r in 0..self.height {
            for c in 0..self.width {
                let (ri, ci) = (r as i64, c as i64);
                let mut neighbors = 0u8;
                for dr in -1..=1 {
                    for dc in -1..=1 {
                        if (dr, dc) != (0, 0) && self.get(ri + dr, ci + dc).is_alive() {
                            neighbors += 1;
                        }
                    }
                }
                next[r * self.width + c] =
                    crate::stepper::apply_rule(self.cells[r * self.width + c], neighbors);
            }
        }
        self.cells = next;
    }

    pub fn population(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_alive()).count()
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.width)
            .map(|row| row.iter().map(|cell| cell.as_u8()).collect())
            .collect()
    }
}
