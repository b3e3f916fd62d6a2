use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{schedule, world};
use crate::game::state::WorldConfig;
use crate::runtime::scheduler::ScheduleConfig;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Side length of the square arena
    pub world_size: u64,
    /// Period of the food spawner
    pub food_interval_ms: u64,
    /// Period of the movement tick
    pub move_interval_ms: u64,
    /// Period of the recombine check
    pub recombine_interval_ms: u64,
    /// Port for the Prometheus endpoint
    pub metrics_port: u16,
    /// Simulated players to run alongside real ones
    pub bot_count: usize,
    /// Fixed RNG seed; random when unset
    pub world_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            world_size: world::DEFAULT_SIZE,
            food_interval_ms: schedule::FOOD_INTERVAL_MS,
            move_interval_ms: schedule::MOVE_INTERVAL_MS,
            recombine_interval_ms: schedule::RECOMBINE_INTERVAL_MS,
            metrics_port: 9090,
            bot_count: 0,
            world_seed: None,
        }
    }
}

/// Parse an env var, warning and returning `None` on garbage
fn read_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(size) = read_env::<u64>("WORLD_SIZE") {
            if size >= world::MIN_SIZE {
                config.world_size = size;
            } else {
                tracing::warn!("WORLD_SIZE must be >= {}, using default", world::MIN_SIZE);
            }
        }

        for (name, slot) in [
            ("FOOD_INTERVAL_MS", &mut config.food_interval_ms),
            ("MOVE_INTERVAL_MS", &mut config.move_interval_ms),
            ("RECOMBINE_INTERVAL_MS", &mut config.recombine_interval_ms),
        ] {
            if let Some(ms) = read_env::<u64>(name) {
                if ms > 0 {
                    *slot = ms;
                } else {
                    tracing::warn!("{} must be > 0, using default", name);
                }
            }
        }

        if let Some(port) = read_env::<u16>("METRICS_PORT") {
            if port > 0 {
                config.metrics_port = port;
            } else {
                tracing::warn!("METRICS_PORT must be > 0, using default");
            }
        }

        if let Some(count) = read_env::<usize>("BOT_COUNT") {
            if count <= 1000 {
                config.bot_count = count;
            } else {
                tracing::warn!("BOT_COUNT must be 0-1000, using default");
            }
        }

        if let Some(seed) = read_env::<u64>("WORLD_SEED") {
            config.world_seed = Some(seed);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.world_size < world::MIN_SIZE {
            return Err(format!("world_size must be at least {}", world::MIN_SIZE));
        }
        if self.food_interval_ms == 0
            || self.move_interval_ms == 0
            || self.recombine_interval_ms == 0
        {
            return Err("schedule intervals must be positive".to_string());
        }
        if self.metrics_port == 0 {
            return Err("Metrics port cannot be 0".to_string());
        }
        Ok(())
    }

    pub fn world_config(&self) -> WorldConfig {
        WorldConfig::new(self.world_size)
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            food_interval: Duration::from_millis(self.food_interval_ms),
            move_interval: Duration::from_millis(self.move_interval_ms),
            recombine_interval: Duration::from_millis(self.recombine_interval_ms),
        }
    }
}
