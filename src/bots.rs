//! Simulated players
//!
//! Bots are ordinary clients: each has its own identity and goes through the
//! same commands a real player would. A single driver task reads one world
//! snapshot per decision round and steers every bot from it.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::constants::{bots, split};
use crate::game::error::WorldError;
use crate::game::state::{Identity, PlayerId, WorldSnapshot};
use crate::game::systems::collision::can_absorb;
use crate::runtime::actor::WorldHandle;
use crate::util::vec2::Vec2;

/// Bot behavior mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotBehavior {
    /// Drift along a heading that changes now and then
    Wander,
    /// Head for the nearest food
    Collect,
    /// Chase a smaller rival
    Chase,
    /// Run from a bigger rival
    Flee,
}

/// One round's steering for a bot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotDecision {
    pub behavior: BotBehavior,
    pub direction: Vec2,
    pub wants_split: bool,
}

#[derive(Debug, Clone)]
struct Bot {
    identity: Identity,
    player_id: PlayerId,
    behavior: BotBehavior,
    heading: Vec2,
}

/// Generate bot names
pub fn generate_bot_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefixes = ["Void", "Quasar", "Pulsar", "Nova", "Horizon", "Nebula", "Dark", "Graviton"];
    let suffixes = ["X", "Prime", "Alpha", "Omega", "One", "Zero", "Max", "Core"];

    format!(
        "{}{}",
        prefixes[rng.gen_range(0..prefixes.len())],
        suffixes[rng.gen_range(0..suffixes.len())]
    )
}

fn random_heading<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    Vec2::new(angle.cos(), angle.sin())
}

/// Keep the closest candidate within `radius`
fn keep_nearest(slot: &mut Option<(Vec2, f32)>, position: Vec2, distance_sq: f32, radius: f32) {
    if distance_sq <= radius * radius && slot.map_or(true, |(_, best)| distance_sq < best) {
        *slot = Some((position, distance_sq));
    }
}

/// Pick a bot's steering from a world snapshot.
///
/// Returns `None` when the bot has no circles left.
pub fn decide<R: Rng + ?Sized>(
    player_id: PlayerId,
    snapshot: &WorldSnapshot,
    heading: Vec2,
    rng: &mut R,
) -> Option<BotDecision> {
    let mut largest = 0u32;
    let mut weighted = Vec2::ZERO;
    let mut total = 0.0f32;
    for entity in snapshot
        .entities
        .iter()
        .filter(|e| e.owner() == Some(player_id))
    {
        largest = largest.max(entity.mass);
        weighted += entity.position * entity.mass as f32;
        total += entity.mass as f32;
    }
    if total <= 0.0 {
        return None;
    }
    let center = weighted * (1.0 / total);

    let mut threat = None;
    let mut prey = None;
    let mut food = None;
    for entity in &snapshot.entities {
        let distance_sq = entity.position.distance_sq_to(center);
        match entity.owner() {
            None => keep_nearest(&mut food, entity.position, distance_sq, bots::COLLECT_RADIUS),
            Some(owner) if owner == player_id => {}
            Some(_) => {
                if can_absorb(entity.mass, largest) {
                    keep_nearest(&mut threat, entity.position, distance_sq, bots::FLEE_RADIUS);
                } else if can_absorb(largest, entity.mass) {
                    keep_nearest(&mut prey, entity.position, distance_sq, bots::CHASE_RADIUS);
                }
            }
        }
    }

    let decision = if let Some((position, _)) = threat {
        BotDecision {
            behavior: BotBehavior::Flee,
            direction: (center - position).normalize(),
            wants_split: false,
        }
    } else if let Some((position, _)) = prey {
        BotDecision {
            behavior: BotBehavior::Chase,
            direction: (position - center).normalize(),
            wants_split: largest >= split::MIN_MASS_TO_SPLIT && rng.gen_bool(bots::SPLIT_CHANCE),
        }
    } else if let Some((position, _)) = food {
        BotDecision {
            behavior: BotBehavior::Collect,
            direction: (position - center).normalize(),
            wants_split: false,
        }
    } else {
        let direction = if heading.length_sq() == 0.0 || rng.gen_bool(bots::WANDER_TURN_CHANCE) {
            random_heading(rng)
        } else {
            heading
        };
        BotDecision {
            behavior: BotBehavior::Wander,
            direction,
            wants_split: false,
        }
    };
    Some(decision)
}

/// Connect `count` bots, put them in the game and start driving them.
///
/// The driver stops on its own once the world stops.
pub async fn spawn_bots(
    world: WorldHandle,
    count: usize,
    seed: Option<u64>,
) -> Result<JoinHandle<()>, WorldError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };

    let mut roster = Vec::with_capacity(count);
    for _ in 0..count {
        let identity = Uuid::new_v4();
        let player_id = world.connect(identity).await?;
        world
            .enter_game(identity, generate_bot_name(&mut rng))
            .await?;
        roster.push(Bot {
            identity,
            player_id,
            behavior: BotBehavior::Wander,
            heading: Vec2::ZERO,
        });
    }
    info!(count, "Bots joined the world");

    Ok(tokio::spawn(drive(world, roster, rng)))
}

async fn drive(world: WorldHandle, mut roster: Vec<Bot>, mut rng: StdRng) {
    let mut ticker = interval(Duration::from_millis(bots::DECISION_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let snapshot = match world.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(WorldError::WorldStopped) => break,
            Err(e) => {
                warn!(error = %e, "Bot snapshot failed");
                continue;
            }
        };

        for bot in &mut roster {
            match step(&world, bot, &snapshot, &mut rng).await {
                Ok(()) => {}
                Err(WorldError::WorldStopped) => {
                    debug!("Bot driver stopped");
                    return;
                }
                Err(e) => warn!(player_id = bot.player_id, error = %e, "Bot command failed"),
            }
        }
    }
    debug!("Bot driver stopped");
}

async fn step(
    world: &WorldHandle,
    bot: &mut Bot,
    snapshot: &WorldSnapshot,
    rng: &mut StdRng,
) -> Result<(), WorldError> {
    let Some(decision) = decide(bot.player_id, snapshot, bot.heading, rng) else {
        // Eaten; the snapshot may be stale, so a live bot is fine too
        return match world.respawn(bot.identity).await {
            Ok(_) | Err(WorldError::AlreadyAlive(_)) => Ok(()),
            Err(e) => Err(e),
        };
    };

    if decision.behavior != bot.behavior {
        debug!(player_id = bot.player_id, behavior = ?decision.behavior, "Bot behavior changed");
    }
    bot.behavior = decision.behavior;
    bot.heading = decision.direction;

    world
        .update_player_input(bot.identity, decision.direction)
        .await?;
    if decision.wants_split {
        world.player_split(bot.identity).await?;
    }
    Ok(())
}
