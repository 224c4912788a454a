//! Process configuration for the life server.
//!
//! Built-in defaults, optionally overlaid by a JSON file, then by `GAME_*`
//! environment variables. Read once at startup and immutable afterwards.

use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use life_proto::ConfigState;
use serde::Deserialize;
use thiserror::Error;

use crate::viewport::WorldBounds;
use crate::world::EdgeMode;

pub const CONFIG_PATH_VAR: &str = "GAME_CONFIG_PATH";
pub const ENV_PREFIX: &str = "GAME_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Total number of rows in the world.
    pub rows: u32,
    /// Total number of columns in the world.
    pub cols: u32,
    /// Seconds per autonomous step.
    pub speed: f64,
    pub cell_color: String,
    pub bg_color: String,
    pub max_viewport_cells: u64,
    pub edge_mode: EdgeMode,
    /// Probability that a cell starts alive.
    pub initial_density: f64,
    pub seed: Option<u64>,
    /// Seconds a new connection has to declare its first viewport.
    pub initial_viewport_timeout: f64,
    pub bind: SocketAddr,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rows: 500,
            cols: 700,
            speed: 0.2,
            cell_color: "#4CAF50".to_string(),
            bg_color: "#111".to_string(),
            max_viewport_cells: 200_000,
            edge_mode: EdgeMode::Wrap,
            initial_density: 0.5,
            seed: None,
            initial_viewport_timeout: 15.0,
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse game config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read game config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Positive and representable as a [`Duration`].
fn is_period(seconds: f64) -> bool {
    seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok()
}

impl GameConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Apply `GAME_*` overrides. `lookup` receives the full variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse()
                .map_err(|err: T::Err| invalid(key, err.to_string()))
        }

        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|raw| (key, raw))
        };

        if let Some((key, raw)) = var("ROWS") {
            self.rows = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("COLS") {
            self.cols = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("SPEED") {
            self.speed = parse(&key, &raw)?;
        }
        if let Some((_, raw)) = var("CELL_COLOR") {
            self.cell_color = raw;
        }
        if let Some((_, raw)) = var("BG_COLOR") {
            self.bg_color = raw;
        }
        if let Some((key, raw)) = var("MAX_VIEWPORT_CELLS") {
            self.max_viewport_cells = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("EDGE_MODE") {
            self.edge_mode = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("INITIAL_DENSITY") {
            self.initial_density = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("SEED") {
            self.seed = Some(parse(&key, &raw)?);
        }
        if let Some((key, raw)) = var("INITIAL_VIEWPORT_TIMEOUT") {
            self.initial_viewport_timeout = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("BIND") {
            self.bind = parse(&key, &raw)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 {
            return Err(invalid("rows", "must be positive"));
        }
        if self.cols == 0 {
            return Err(invalid("cols", "must be positive"));
        }
        if self.max_viewport_cells == 0 {
            return Err(invalid("max_viewport_cells", "must be positive"));
        }
        if !is_period(self.speed) {
            return Err(invalid("speed", "must be a positive number of seconds"));
        }
        if !is_period(self.initial_viewport_timeout) {
            return Err(invalid(
                "initial_viewport_timeout",
                "must be a positive number of seconds",
            ));
        }
        if !(0.0..=1.0).contains(&self.initial_density) {
            return Err(invalid("initial_density", "must be within [0, 1]"));
        }
        Ok(())
    }

    /// Only meaningful on a validated config.
    pub fn step_period(&self) -> Duration {
        Duration::from_secs_f64(self.speed)
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.initial_viewport_timeout)
    }

    pub fn bounds(&self) -> WorldBounds {
        WorldBounds::new(self.rows, self.cols)
    }

    /// Payload of the `config` message sent at connection start.
    pub fn client_state(&self) -> ConfigState {
        ConfigState {
            rows: self.rows,
            cols: self.cols,
            speed: self.speed,
            cell_color: self.cell_color.clone(),
            bg_color: self.bg_color.clone(),
        }
    }
}

/// Load configuration from an explicit path, `GAME_CONFIG_PATH`, or defaults,
/// then apply environment overrides.
pub fn load_game_config(explicit: Option<&Path>) -> Result<GameConfig, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from));

    let mut config = match path {
        Some(path) => {
            let config = GameConfig::from_file(&path)?;
            tracing::info!(
                target: "life_sim::config",
                path = %path.display(),
                "config.loaded=file"
            );
            config
        }
        None => {
            tracing::info!(target: "life_sim::config", "config.loaded=builtin");
            GameConfig::default()
        }
    };

    config.apply_overrides(|key| env::var(key).ok())?;
    Ok(config)
}
