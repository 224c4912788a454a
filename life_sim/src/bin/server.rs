use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use life_sim::{
    build_world, load_game_config, LifeServer, ServerMetrics, SessionSettings, SharedWorld,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Windowed Game of Life streaming server", long_about = None)]
struct Cli {
    /// JSON config file. Falls back to GAME_CONFIG_PATH, then built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address to listen on; overrides the configured bind address.
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config =
        load_game_config(cli.config.as_deref()).context("failed to load game config")?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let world = build_world(&config);
    let population = world.population();
    let server = LifeServer::bind(
        config.bind,
        SharedWorld::new(world),
        SessionSettings::from_config(&config),
        Arc::new(ServerMetrics::default()),
    )
    .with_context(|| format!("failed to bind listener on {}", config.bind))?;

    info!(
        target: "life_sim::server",
        bind = %server.local_addr()?,
        rows = config.rows,
        cols = config.cols,
        edge_mode = %config.edge_mode,
        speed = config.speed,
        population,
        "Life server ready"
    );

    server.serve().context("accept loop failed")
}
