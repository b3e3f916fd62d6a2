//! World actor
//!
//! The single writer of the world store. Client commands and scheduled
//! triggers arrive on one queue and run to completion one at a time, each as
//! an atomic action: it either commits in full or leaves the store untouched.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::game::error::WorldError;
use crate::game::lifecycle::{self, PlayerStats};
use crate::game::state::{
    EntityId, Identity, PlayerId, Timestamp, WorldConfig, WorldSnapshot, WorldState,
};
use crate::game::systems::{movement, spawner, split};
use crate::metrics::Metrics;
use crate::runtime::scheduler::{self, PendingTasks, ScheduleConfig, ScheduledTask};
use crate::util::vec2::Vec2;

/// Pending commands before senders start waiting
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

type Reply<T> = oneshot::Sender<Result<T, WorldError>>;

/// Request to the world actor
#[derive(Debug)]
pub enum Command {
    Initialize { config: WorldConfig, reply: Reply<()> },
    Connect { identity: Identity, reply: Reply<PlayerId> },
    Disconnect { identity: Identity, reply: Reply<()> },
    EnterGame { identity: Identity, name: String, reply: Reply<EntityId> },
    UpdatePlayerInput { identity: Identity, direction: Vec2, reply: Reply<usize> },
    Respawn { identity: Identity, reply: Reply<EntityId> },
    Suicide { identity: Identity, reply: Reply<usize> },
    PlayerSplit { identity: Identity, reply: Reply<Vec<EntityId>> },
    PlayerStats { identity: Identity, reply: Reply<PlayerStats> },
    Snapshot { reply: Reply<WorldSnapshot> },
    /// Fired by the scheduler; nobody waits for the outcome
    Scheduled(ScheduledTask),
}

/// Current wall-clock time in microseconds since the Unix epoch
pub fn now_micros() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as Timestamp)
        .unwrap_or(0)
}

/// Owner of the world store
pub struct WorldActor {
    state: Option<WorldState>,
    rng: StdRng,
    receiver: mpsc::Receiver<Command>,
    sender: mpsc::WeakSender<Command>,
    schedule: ScheduleConfig,
    pending: Arc<PendingTasks>,
    triggers: Vec<JoinHandle<()>>,
    metrics: Arc<Metrics>,
}

impl WorldActor {
    /// Spawn the actor on the current runtime.
    ///
    /// The world starts uninitialized; every command but `Initialize` fails
    /// with [`WorldError::NotInitialized`] until it runs. A `seed` makes
    /// food and spawn placement reproducible.
    pub fn spawn(
        schedule: ScheduleConfig,
        seed: Option<u64>,
        metrics: Arc<Metrics>,
    ) -> (WorldHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let actor = WorldActor {
            state: None,
            rng,
            receiver,
            sender: sender.downgrade(),
            schedule,
            pending: Arc::new(PendingTasks::default()),
            triggers: Vec::new(),
            metrics,
        };
        let task = tokio::spawn(actor.run());
        (WorldHandle { sender }, task)
    }

    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            self.handle(command);
        }

        for trigger in self.triggers.drain(..) {
            trigger.abort();
        }
        info!("World actor stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Initialize { config, reply } => {
                let _ = reply.send(self.initialize(config));
            }
            Command::Connect { identity, reply } => {
                let result =
                    self.apply("connect", |state, _, _| lifecycle::connect(state, identity));
                let _ = reply.send(result);
            }
            Command::Disconnect { identity, reply } => {
                let result =
                    self.apply("disconnect", |state, _, _| lifecycle::disconnect(state, identity));
                let _ = reply.send(result);
            }
            Command::EnterGame { identity, name, reply } => {
                let result = self.apply("enter_game", |state, rng, now| {
                    lifecycle::enter_game(state, identity, &name, now, rng)
                });
                let _ = reply.send(result);
            }
            Command::UpdatePlayerInput { identity, direction, reply } => {
                let result = self.apply("update_player_input", |state, _, _| {
                    lifecycle::update_player_input(state, identity, direction)
                });
                let _ = reply.send(result);
            }
            Command::Respawn { identity, reply } => {
                let result = self.apply("respawn", |state, rng, now| {
                    lifecycle::respawn(state, identity, now, rng)
                });
                let _ = reply.send(result);
            }
            Command::Suicide { identity, reply } => {
                let result =
                    self.apply("suicide", |state, _, _| lifecycle::suicide(state, identity));
                let _ = reply.send(result);
            }
            Command::PlayerSplit { identity, reply } => {
                let result = self.apply("player_split", |state, _, now| {
                    lifecycle::player_split(state, identity, now)
                });
                let _ = reply.send(result);
            }
            Command::PlayerStats { identity, reply } => {
                let result = self
                    .state
                    .as_ref()
                    .ok_or(WorldError::NotInitialized)
                    .and_then(|state| lifecycle::player_stats(state, identity));
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let result = self
                    .state
                    .as_ref()
                    .map(WorldState::snapshot)
                    .ok_or(WorldError::NotInitialized);
                let _ = reply.send(result);
            }
            Command::Scheduled(task) => self.run_scheduled(task),
        }
    }

    fn initialize(&mut self, config: WorldConfig) -> Result<(), WorldError> {
        if self.state.is_some() {
            warn!("World initialized twice, ignoring");
            return Err(WorldError::AlreadyInitialized);
        }

        self.state = Some(WorldState::new(config));
        self.triggers = scheduler::arm(
            self.sender.clone(),
            &self.schedule,
            self.pending.clone(),
            self.metrics.clone(),
        );
        info!(world_size = config.world_size, "World initialized");
        Ok(())
    }

    fn run_scheduled(&mut self, task: ScheduledTask) {
        self.pending.clear(task);
        match task {
            ScheduledTask::SpawnFood => {
                if let Ok(spawned) =
                    self.apply(task.name(), |state, rng, _| Ok(spawner::spawn_food(state, rng)))
                {
                    self.metrics
                        .food_spawned
                        .fetch_add(spawned as u64, Ordering::Relaxed);
                }
            }
            ScheduledTask::MoveAllPlayers => {
                let started = Instant::now();
                if let Ok(report) =
                    self.apply(task.name(), |state, _, _| movement::move_all_players(state))
                {
                    self.metrics.record_tick(started.elapsed(), &report);
                    if report.circles_absorbed > 0 {
                        debug!(
                            absorbed = report.circles_absorbed,
                            mass = report.mass_absorbed,
                            "Circles absorbed"
                        );
                    }
                }
            }
            ScheduledTask::RecombineCircles => {
                if let Ok(merged) =
                    self.apply(task.name(), |state, _, now| split::recombine_circles(state, now))
                {
                    self.metrics
                        .circles_recombined
                        .fetch_add(merged as u64, Ordering::Relaxed);
                }
            }
        }
    }

    /// Run one action atomically against the store
    fn apply<T, F>(&mut self, action: &'static str, f: F) -> Result<T, WorldError>
    where
        F: FnOnce(&mut WorldState, &mut StdRng, Timestamp) -> Result<T, WorldError>,
    {
        let now = now_micros();
        let rng = &mut self.rng;
        let result = match self.state.as_mut() {
            Some(state) => state.atomically(|working| f(working, rng, now)),
            None => Err(WorldError::NotInitialized),
        };

        let violation = match &result {
            Ok(_) => false,
            Err(e) if e.is_consistency_violation() => {
                error!(action, error = %e, "Action aborted");
                true
            }
            Err(e) => {
                warn!(action, error = %e, "Action rejected");
                false
            }
        };
        self.metrics.record_action(result.is_err(), violation);
        if let Some(state) = self.state.as_ref() {
            self.metrics.observe_world(state);
        }
        result
    }
}

/// Cloneable client of the world actor
#[derive(Debug, Clone)]
pub struct WorldHandle {
    sender: mpsc::Sender<Command>,
}

impl WorldHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, WorldError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| WorldError::WorldStopped)?;
        response.await.map_err(|_| WorldError::WorldStopped)?
    }

    pub async fn initialize(&self, config: WorldConfig) -> Result<(), WorldError> {
        self.request(|reply| Command::Initialize { config, reply }).await
    }

    pub async fn connect(&self, identity: Identity) -> Result<PlayerId, WorldError> {
        self.request(|reply| Command::Connect { identity, reply }).await
    }

    pub async fn disconnect(&self, identity: Identity) -> Result<(), WorldError> {
        self.request(|reply| Command::Disconnect { identity, reply }).await
    }

    pub async fn enter_game(
        &self,
        identity: Identity,
        name: impl Into<String>,
    ) -> Result<EntityId, WorldError> {
        let name = name.into();
        self.request(|reply| Command::EnterGame { identity, name, reply }).await
    }

    pub async fn update_player_input(
        &self,
        identity: Identity,
        direction: Vec2,
    ) -> Result<usize, WorldError> {
        self.request(|reply| Command::UpdatePlayerInput { identity, direction, reply })
            .await
    }

    pub async fn respawn(&self, identity: Identity) -> Result<EntityId, WorldError> {
        self.request(|reply| Command::Respawn { identity, reply }).await
    }

    pub async fn suicide(&self, identity: Identity) -> Result<usize, WorldError> {
        self.request(|reply| Command::Suicide { identity, reply }).await
    }

    pub async fn player_split(&self, identity: Identity) -> Result<Vec<EntityId>, WorldError> {
        self.request(|reply| Command::PlayerSplit { identity, reply }).await
    }

    pub async fn player_stats(&self, identity: Identity) -> Result<PlayerStats, WorldError> {
        self.request(|reply| Command::PlayerStats { identity, reply }).await
    }

    pub async fn snapshot(&self) -> Result<WorldSnapshot, WorldError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Enqueue a scheduled action out of band.
    ///
    /// It runs after everything already queued; any later request observes
    /// its effect.
    pub async fn run_now(&self, task: ScheduledTask) -> Result<(), WorldError> {
        self.sender
            .send(Command::Scheduled(task))
            .await
            .map_err(|_| WorldError::WorldStopped)
    }
}
