//! Spawner
//!
//! Keeps the arena stocked with food and creates player circles.

use rand::Rng;
use tracing::{debug, trace};

use crate::game::constants::{food, mass};
use crate::game::state::{Circle, EntityId, PlayerId, Timestamp, WorldConfig, WorldState};
use crate::util::vec2::Vec2;

/// Top food up to the target population.
///
/// Does nothing while nobody is playing. Never removes food.
/// Returns the number of food entities created.
pub fn spawn_food<R: Rng + ?Sized>(state: &mut WorldState, rng: &mut R) -> usize {
    if state.player_count() == 0 {
        return 0;
    }

    let mut spawned = 0;
    while state.food_count() < food::TARGET_COUNT {
        let food_mass = rng.gen_range(food::MASS_MIN..=food::MASS_MAX);
        let position = random_position(state.config(), food_mass, rng);
        let entity_id = state.insert_food(position, food_mass);
        trace!(entity_id, mass = food_mass, "Spawned food");
        spawned += 1;
    }

    if spawned > 0 {
        debug!(spawned, total = state.food_count(), "Food replenished");
    }
    spawned
}

/// Uniform random position inside the valid bounds for a circle of `mass`
pub fn random_position<R: Rng + ?Sized>(config: &WorldConfig, mass: u32, rng: &mut R) -> Vec2 {
    let (min, max) = config.axis_bounds(mass);
    Vec2::new(rng.gen_range(min..=max), rng.gen_range(min..=max))
}

/// Create the starting circle for a player entering the game
pub fn spawn_player_initial_circle<R: Rng + ?Sized>(
    state: &mut WorldState,
    player_id: PlayerId,
    now: Timestamp,
    rng: &mut R,
) -> EntityId {
    let position = random_position(state.config(), mass::START, rng);
    spawn_circle_at(state, player_id, mass::START, position, now)
}

/// Create an entity plus circle for `player_id`.
///
/// New circles face up and stand still until the owner sends input.
pub fn spawn_circle_at(
    state: &mut WorldState,
    player_id: PlayerId,
    circle_mass: u32,
    position: Vec2,
    now: Timestamp,
) -> EntityId {
    let circle = Circle {
        player_id,
        direction: Vec2::UP,
        speed: 0.0,
        last_split_time: now,
    };
    let entity_id = state.insert_circle(position, circle_mass, circle);
    debug!(entity_id, player_id, mass = circle_mass, "Spawned circle");
    entity_id
}
