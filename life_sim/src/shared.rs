use std::sync::Arc;

use life_proto::Viewport;
use parking_lot::Mutex;

use crate::region::{step_viewport, Margin};
use crate::stepper::CellGrid;
use crate::world::World;

/// The one world every connection observes.
///
/// All mutation goes through [`SharedWorld::step`], which holds the lock for
/// the whole extract/step/write-back sequence so no step ever observes
/// another step half-applied.
#[derive(Debug, Clone)]
pub struct SharedWorld {
    inner: Arc<Mutex<World>>,
    height: usize,
    width: usize,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        let (height, width) = (world.height(), world.width());
        Self {
            inner: Arc::new(Mutex::new(world)),
            height,
            width,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn step(&self, viewport: &Viewport, margin: Margin) -> CellGrid {
        let mut world = self.inner.lock();
        step_viewport(&mut world, viewport, margin)
    }

    /// Run `f` against the world under the lock. Intended for inspection.
    pub fn with_world<T>(&self, f: impl FnOnce(&World) -> T) -> T {
        f(&self.inner.lock())
    }
}
