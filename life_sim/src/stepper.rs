//! Conway's rule applied to a standalone rectangular buffer.
//!
//! The buffer's own edges are hard: cells beyond them simply do not exist.
//! Callers needing correct edge cells must extract enough surrounding
//! context first (see [`crate::region`]).

use crate::world::Cell;

/// Moore neighborhood radius.
pub const NEIGHBORHOOD_RADIUS: usize = 1;

/// Row-major rectangular cell buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl CellGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::Dead; rows * cols],
        }
    }

    /// Build from a 0/1 matrix. Short rows are padded dead.
    pub fn from_rows(rows: &[Vec<u8>]) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut grid = Self::new(rows.len(), cols);
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                grid.set(r, c, Cell::from_u8(value));
            }
        }
        grid
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        self.cells[row * self.cols + col] = value;
    }

    /// Count live Moore neighbors that lie inside the buffer.
    fn live_neighbors(&self, row: usize, col: usize) -> u8 {
        let r_lo = row.saturating_sub(1);
        let r_hi = (row + 1).min(self.rows - 1);
        let c_lo = col.saturating_sub(1);
        let c_hi = (col + 1).min(self.cols - 1);
        let mut count = 0;
        for r in r_lo..=r_hi {
            for c in c_lo..=c_hi {
                if (r, c) != (row, col) && self.get(r, c).is_alive() {
                    count += 1;
                }
            }
        }
        count
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.cells
            .chunks(self.cols)
            .map(|row| row.iter().map(|cell| cell.as_u8()).collect())
            .collect()
    }
}

/// Survival on 2 or 3 neighbors, birth on exactly 3.
#[inline]
pub fn apply_rule(cell: Cell, live_neighbors: u8) -> Cell {
    match (cell, live_neighbors) {
        (Cell::Alive, 2) | (Cell::Alive, 3) => Cell::Alive,
        (Cell::Dead, 3) => Cell::Alive,
        _ => Cell::Dead,
    }
}

/// Next generation of `buffer`, same dimensions.
pub fn next_generation(buffer: &CellGrid) -> CellGrid {
    let mut next = CellGrid::new(buffer.rows, buffer.cols);
    for row in 0..buffer.rows {
        for col in 0..buffer.cols {
            let cell = apply_rule(buffer.get(row, col), buffer.live_neighbors(row, col));
            next.set(row, col, cell);
        }
    }
    next
}
