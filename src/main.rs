mod config;
mod game;
mod metrics;
mod runtime;
mod util;

#[cfg(feature = "bots")]
mod bots;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::runtime::actor::WorldActor;

/// How often the world summary is logged
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Blackholio Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: world_size={}, food={}ms, move={}ms, bots={}",
        config.world_size, config.food_interval_ms, config.move_interval_ms, config.bot_count
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Start the world
    let (world, world_task) =
        WorldActor::spawn(config.schedule(), config.world_seed, metrics.clone());
    world.initialize(config.world_config()).await?;

    #[cfg(feature = "bots")]
    let bot_driver = if config.bot_count > 0 {
        Some(bots::spawn_bots(world.clone(), config.bot_count, config.world_seed).await?)
    } else {
        None
    };
    #[cfg(not(feature = "bots"))]
    if config.bot_count > 0 {
        warn!("BOT_COUNT set but the bots feature is disabled");
    }

    info!("Server ready");

    // Log stats periodically
    let stats_metrics = metrics.clone();
    let stats_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_LOG_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!(
                "World: {}s, tick {}, {} players ({} away), {} circles, {} food | p99 {}us",
                stats_metrics.uptime_seconds(),
                stats_metrics.tick_count.load(Ordering::Relaxed),
                stats_metrics.players.load(Ordering::Relaxed),
                stats_metrics.logged_out_players.load(Ordering::Relaxed),
                stats_metrics.circles.load(Ordering::Relaxed),
                stats_metrics.food.load(Ordering::Relaxed),
                stats_metrics.tick_time_p99_us.load(Ordering::Relaxed),
            );
        }
    });

    // Shutdown signal handler
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutting down...");

    // Cleanup: the actor stops once every handle is gone
    stats_task.abort();
    #[cfg(feature = "bots")]
    if let Some(driver) = bot_driver {
        driver.abort();
        let _ = driver.await;
    }
    drop(world);
    if let Err(e) = world_task.await {
        error!("World actor failed: {}", e);
    }
    info!("Server stopped");

    Ok(())
}
