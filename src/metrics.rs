//! Prometheus-compatible metrics endpoint
//!
//! Exposes world server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::state::WorldState;
use crate::game::systems::movement::TickReport;

/// Rolling window of movement tick durations kept for percentiles
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the world server
#[derive(Debug)]
pub struct Metrics {
    // World population
    pub players: AtomicU64,
    pub logged_out_players: AtomicU64,
    pub entities: AtomicU64,
    pub circles: AtomicU64,
    pub food: AtomicU64,

    // Movement tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Simulation counters
    pub food_spawned: AtomicU64,
    pub food_eaten: AtomicU64,
    pub circles_absorbed: AtomicU64,
    pub circles_recombined: AtomicU64,

    // Action outcomes
    pub actions_total: AtomicU64,
    pub actions_failed: AtomicU64,
    pub consistency_violations: AtomicU64,
    pub scheduled_ticks_dropped: AtomicU64,

    start_time: Instant,

    // VecDeque for O(1) pop_front
    tick_history: RwLock<VecDeque<u64>>,
}

/// JSON view of the metrics
#[derive(Debug, Serialize)]
struct MetricsJson {
    players: u64,
    logged_out_players: u64,
    entities: u64,
    circles: u64,
    food: u64,
    tick_time_us: u64,
    tick_time_p95_us: u64,
    tick_time_p99_us: u64,
    tick_time_max_us: u64,
    tick_count: u64,
    actions_failed: u64,
    consistency_violations: u64,
    uptime_seconds: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players: AtomicU64::new(0),
            logged_out_players: AtomicU64::new(0),
            entities: AtomicU64::new(0),
            circles: AtomicU64::new(0),
            food: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            food_spawned: AtomicU64::new(0),
            food_eaten: AtomicU64::new(0),
            circles_absorbed: AtomicU64::new(0),
            circles_recombined: AtomicU64::new(0),
            actions_total: AtomicU64::new(0),
            actions_failed: AtomicU64::new(0),
            consistency_violations: AtomicU64::new(0),
            scheduled_ticks_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a movement tick and update percentiles
    pub fn record_tick(&self, duration: Duration, report: &TickReport) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.food_eaten
            .fetch_add(report.food_eaten as u64, Ordering::Relaxed);
        self.circles_absorbed
            .fetch_add(report.circles_absorbed as u64, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us
                .store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Refresh population gauges from the store
    pub fn observe_world(&self, state: &WorldState) {
        self.players
            .store(state.player_count() as u64, Ordering::Relaxed);
        self.logged_out_players
            .store(state.logged_out_count() as u64, Ordering::Relaxed);
        self.entities
            .store(state.entity_count() as u64, Ordering::Relaxed);
        self.circles
            .store(state.circle_count() as u64, Ordering::Relaxed);
        self.food.store(state.food_count() as u64, Ordering::Relaxed);
    }

    /// Count an action outcome
    pub fn record_action(&self, failed: bool, consistency_violation: bool) {
        self.actions_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.actions_failed.fetch_add(1, Ordering::Relaxed);
        }
        if consistency_violation {
            self.consistency_violations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!(
            "blackholio_players",
            "Connected players",
            "gauge",
            self.players.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_players_logged_out",
            "Archived players awaiting reconnect",
            "gauge",
            self.logged_out_players.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_entities",
            "Entities in the arena",
            "gauge",
            self.entities.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_circles",
            "Player circles in the arena",
            "gauge",
            self.circles.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_food",
            "Food entities in the arena",
            "gauge",
            self.food.load(Ordering::Relaxed)
        );

        metric!(
            "blackholio_tick_time_microseconds",
            "Last movement tick time",
            "gauge",
            self.tick_time_us.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_tick_time_p95_microseconds",
            "95th percentile movement tick time",
            "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_tick_time_p99_microseconds",
            "99th percentile movement tick time",
            "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_tick_time_max_microseconds",
            "Maximum movement tick time",
            "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_tick_count",
            "Movement ticks processed",
            "counter",
            self.tick_count.load(Ordering::Relaxed)
        );

        metric!(
            "blackholio_food_spawned_total",
            "Food entities spawned",
            "counter",
            self.food_spawned.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_food_eaten_total",
            "Food entities eaten",
            "counter",
            self.food_eaten.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_circles_absorbed_total",
            "Circles absorbed by rivals",
            "counter",
            self.circles_absorbed.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_circles_recombined_total",
            "Circles merged back into a sibling",
            "counter",
            self.circles_recombined.load(Ordering::Relaxed)
        );

        metric!(
            "blackholio_actions_total",
            "World actions executed",
            "counter",
            self.actions_total.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_actions_failed_total",
            "World actions aborted",
            "counter",
            self.actions_failed.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_consistency_violations_total",
            "Actions aborted on a broken invariant",
            "counter",
            self.consistency_violations.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_scheduled_ticks_dropped_total",
            "Scheduled firings skipped while one was queued",
            "counter",
            self.scheduled_ticks_dropped.load(Ordering::Relaxed)
        );
        metric!(
            "blackholio_uptime_seconds",
            "Server uptime in seconds",
            "counter",
            self.uptime_seconds()
        );

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        let view = MetricsJson {
            players: self.players.load(Ordering::Relaxed),
            logged_out_players: self.logged_out_players.load(Ordering::Relaxed),
            entities: self.entities.load(Ordering::Relaxed),
            circles: self.circles.load(Ordering::Relaxed),
            food: self.food.load(Ordering::Relaxed),
            tick_time_us: self.tick_time_us.load(Ordering::Relaxed),
            tick_time_p95_us: self.tick_time_p95_us.load(Ordering::Relaxed),
            tick_time_p99_us: self.tick_time_p99_us.load(Ordering::Relaxed),
            tick_time_max_us: self.tick_time_max_us.load(Ordering::Relaxed),
            tick_count: self.tick_count.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            consistency_violations: self.consistency_violations.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
        };
        serde_json::to_string_pretty(&view).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // Longest prefix first
                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::WorldConfig;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_record_tick() {
        let metrics = Metrics::new();
        let report = TickReport {
            circles_moved: 3,
            food_eaten: 2,
            circles_absorbed: 1,
            mass_absorbed: 20,
        };

        for i in 0..100 {
            metrics.record_tick(Duration::from_micros(100 + i * 10), &report);
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.food_eaten.load(Ordering::Relaxed), 200);
        assert_eq!(metrics.circles_absorbed.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1000);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_observe_world() {
        let metrics = Metrics::new();
        let mut state = WorldState::new(WorldConfig::default());
        state.insert_food(Vec2::new(10.0, 10.0), 2);
        state.insert_food(Vec2::new(20.0, 10.0), 2);

        metrics.observe_world(&state);

        assert_eq!(metrics.food.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.entities.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.circles.load(Ordering::Relaxed), 0);
        assert!(metrics.to_prometheus().contains("blackholio_entities 2\n"));
    }

    #[test]
    fn test_record_action() {
        let metrics = Metrics::new();
        metrics.record_action(false, false);
        metrics.record_action(true, false);
        metrics.record_action(true, true);

        assert_eq!(metrics.actions_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.actions_failed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.consistency_violations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.players.store(5, Ordering::Relaxed);
        metrics.food.store(600, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("blackholio_players 5"));
        assert!(output.contains("blackholio_food 600"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.circles.store(12, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();

        assert_eq!(value["circles"], 12);
        assert_eq!(value["tick_count"], 0);
    }
}
