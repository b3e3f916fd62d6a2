//! Recurring world triggers
//!
//! Each trigger is a background task that enqueues a scheduled action on the
//! world's command queue at a fixed period. Triggers never touch the store
//! themselves; the actor runs the action like any other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::constants::schedule;
use crate::metrics::Metrics;
use crate::runtime::actor::Command;

/// Scheduled world action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledTask {
    SpawnFood,
    MoveAllPlayers,
    RecombineCircles,
}

impl ScheduledTask {
    pub fn name(self) -> &'static str {
        match self {
            ScheduledTask::SpawnFood => "spawn_food",
            ScheduledTask::MoveAllPlayers => "move_all_players",
            ScheduledTask::RecombineCircles => "recombine_circles",
        }
    }
}

/// Trigger periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub food_interval: Duration,
    pub move_interval: Duration,
    pub recombine_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            food_interval: Duration::from_millis(schedule::FOOD_INTERVAL_MS),
            move_interval: Duration::from_millis(schedule::MOVE_INTERVAL_MS),
            recombine_interval: Duration::from_millis(schedule::RECOMBINE_INTERVAL_MS),
        }
    }
}

impl ScheduleConfig {
    fn entries(&self) -> [(ScheduledTask, Duration); 3] {
        [
            (ScheduledTask::SpawnFood, self.food_interval),
            (ScheduledTask::MoveAllPlayers, self.move_interval),
            (ScheduledTask::RecombineCircles, self.recombine_interval),
        ]
    }
}

/// One flag per task, set while a firing sits in the command queue
#[derive(Debug, Default)]
pub(crate) struct PendingTasks {
    spawn_food: AtomicBool,
    move_all_players: AtomicBool,
    recombine_circles: AtomicBool,
}

impl PendingTasks {
    fn flag(&self, task: ScheduledTask) -> &AtomicBool {
        match task {
            ScheduledTask::SpawnFood => &self.spawn_food,
            ScheduledTask::MoveAllPlayers => &self.move_all_players,
            ScheduledTask::RecombineCircles => &self.recombine_circles,
        }
    }

    /// Mark `task` queued. Returns `false` if it already was.
    fn mark(&self, task: ScheduledTask) -> bool {
        !self.flag(task).swap(true, Ordering::AcqRel)
    }

    /// Called by the actor when it takes `task` off the queue
    pub(crate) fn clear(&self, task: ScheduledTask) {
        self.flag(task).store(false, Ordering::Release);
    }

    #[cfg(test)]
    fn is_pending(&self, task: ScheduledTask) -> bool {
        self.flag(task).load(Ordering::Acquire)
    }
}

/// Start every trigger. The first firing of each comes one period from now.
///
/// At most one firing per task waits in the queue; a firing that finds the
/// previous one still pending is skipped. Triggers hold only a weak sender,
/// so they stop on their own once every
/// [`WorldHandle`](crate::runtime::actor::WorldHandle) is gone.
pub(crate) fn arm(
    sender: mpsc::WeakSender<Command>,
    config: &ScheduleConfig,
    pending: Arc<PendingTasks>,
    metrics: Arc<Metrics>,
) -> Vec<JoinHandle<()>> {
    config
        .entries()
        .into_iter()
        .map(|(task, period)| {
            spawn_trigger(sender.clone(), task, period, pending.clone(), metrics.clone())
        })
        .collect()
}

fn spawn_trigger(
    sender: mpsc::WeakSender<Command>,
    task: ScheduledTask,
    period: Duration,
    pending: Arc<PendingTasks>,
    metrics: Arc<Metrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(task = task.name(), period_ms = period.as_millis() as u64, "Trigger armed");

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                break;
            };
            if !pending.mark(task) {
                metrics.scheduled_ticks_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(task = task.name(), "Previous firing still queued, trigger skipped");
                continue;
            }
            match sender.try_send(Command::Scheduled(task)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    pending.clear(task);
                    metrics.scheduled_ticks_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(task = task.name(), "Command queue full, trigger skipped");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }

        debug!(task = task.name(), "Trigger stopped");
    })
}
