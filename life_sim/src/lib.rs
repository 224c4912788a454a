//! Windowed Game of Life server.
//!
//! One shared [`World`] is advanced only where someone is looking: each
//! connection's [`Session`] steps the cells under its viewport on a fixed
//! cadence, or immediately when the viewport moves, and streams the visible
//! slice back.

pub mod config;
pub mod metrics;
pub mod network;
pub mod region;
pub mod session;
mod shared;
pub mod stepper;
pub mod viewport;
pub mod world;

pub use config::{load_game_config, ConfigError, GameConfig};
pub use life_proto::{ServerMessage, Viewport};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use network::{LifeServer, LineTransport};
pub use region::{extract_region, step_viewport, Margin, MarginError};
pub use session::{Inbound, Session, SessionError, SessionSettings, Transport, TransportError};
pub use shared::SharedWorld;
pub use stepper::{next_generation, CellGrid};
pub use viewport::{normalize, InvalidViewport, WorldBounds};
pub use world::{Cell, EdgeMode, World};

use rand::{rngs::SmallRng, SeedableRng};

/// Build the startup world described by `config`, randomized at its
/// configured density.
pub fn build_world(config: &GameConfig) -> World {
    let mut rng = match config.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let mut world = World::new(config.rows as usize, config.cols as usize, config.edge_mode);
    world.randomize(config.initial_density, &mut rng);
    world
}
