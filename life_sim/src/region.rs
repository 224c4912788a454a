//! Windowed stepping: advance only the cells under a viewport.
//!
//! A region is the viewport grown by a margin on every side. The margin
//! supplies neighbor context for the viewport's edge cells and is thrown
//! away after the step.

use life_proto::Viewport;
use thiserror::Error;

use crate::stepper::{next_generation, CellGrid, NEIGHBORHOOD_RADIUS};
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("margin {margin} is smaller than the neighborhood radius {radius}")]
pub struct MarginError {
    pub margin: usize,
    pub radius: usize,
}

/// Border width around a viewport. Never smaller than the neighborhood radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Margin(usize);

impl Margin {
    pub const MOORE: Margin = Margin(NEIGHBORHOOD_RADIUS);

    pub fn new(margin: usize) -> Result<Self, MarginError> {
        if margin < NEIGHBORHOOD_RADIUS {
            return Err(MarginError {
                margin,
                radius: NEIGHBORHOOD_RADIUS,
            });
        }
        Ok(Self(margin))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Margin {
    fn default() -> Self {
        Self::MOORE
    }
}

/// Copy `[y - m, y + rows + m) x [x - m, x + cols + m)` out of the world,
/// resolving coordinates with the world's edge mode.
pub fn extract_region(world: &World, viewport: &Viewport, margin: Margin) -> CellGrid {
    let m = margin.get();
    let rows = viewport.rows as usize + 2 * m;
    let cols = viewport.cols as usize + 2 * m;
    let top = i64::from(viewport.y) - m as i64;
    let left = i64::from(viewport.x) - m as i64;

    let mut buffer = CellGrid::new(rows, cols);
    for r in 0..rows {
        for c in 0..cols {
            buffer.set(r, c, world.get(top + r as i64, left + c as i64));
        }
    }
    buffer
}

/// Advance the viewport's cells one generation in place and return them.
///
/// Only the inner `rows x cols` block is written back. The caller must hold
/// whatever exclusion guards `world` for the whole call.
pub fn step_viewport(world: &mut World, viewport: &Viewport, margin: Margin) -> CellGrid {
    let m = margin.get();
    let stepped = next_generation(&extract_region(world, viewport, margin));

    let mut visible = CellGrid::new(viewport.rows as usize, viewport.cols as usize);
    for r in 0..visible.rows() {
        for c in 0..visible.cols() {
            let (row, col) = (
                i64::from(viewport.y) + r as i64,
                i64::from(viewport.x) + c as i64,
            );
            world.set(row, col, stepped.get(r + m, c + m));
            // Read back so off-world cells of a bounded world stay dead.
            visible.set(r, c, world.get(row, col));
        }
    }
    visible
}
