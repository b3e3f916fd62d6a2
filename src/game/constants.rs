//! Gameplay constants
//!
//! Grouped by concern the same way the tuning knobs are discussed:
//! world, mass, movement, food, split, schedule.

/// World constants
pub mod world {
    /// Default side length of the square arena
    pub const DEFAULT_SIZE: u64 = 1000;
    /// Smallest arena that still fits a starting circle with room to move
    pub const MIN_SIZE: u64 = 64;
}

/// Mass-related constants
pub mod mass {
    /// Mass of a freshly spawned player circle
    pub const START: u32 = 15;
    /// Mass ratio (other / self) below which a rival circle is absorbed.
    /// Near-equal circles never eat each other.
    pub const ABSORB_RATIO: f32 = 0.85;
}

/// Movement constants
pub mod movement {
    /// Speed of a circle at START mass is BASE_SPEED; tiny circles approach 2x this
    pub const BASE_SPEED: f32 = 10.0;
}

/// Food constants
pub mod food {
    /// Food population the spawner tops up to
    pub const TARGET_COUNT: usize = 600;
    /// Minimum food mass (inclusive)
    pub const MASS_MIN: u32 = 2;
    /// Maximum food mass (inclusive)
    pub const MASS_MAX: u32 = 4;
}

/// Split and recombine constants
pub mod split {
    /// Circles lighter than this cannot split
    pub const MIN_MASS_TO_SPLIT: u32 = 30;
    /// Hard cap on circles owned by one player
    pub const MAX_CIRCLES_PER_PLAYER: usize = 16;
    /// Time after a split before sibling circles may merge again (microseconds)
    pub const RECOMBINE_DELAY_MICROS: u64 = 5_000_000;
}

/// Scheduler intervals
pub mod schedule {
    /// Food replenishment interval in milliseconds
    pub const FOOD_INTERVAL_MS: u64 = 500;
    /// Movement/collision tick interval in milliseconds (20 Hz)
    pub const MOVE_INTERVAL_MS: u64 = 50;
    /// Sibling recombination interval in milliseconds
    pub const RECOMBINE_INTERVAL_MS: u64 = 1000;
    /// Movement ticks per second at the default interval
    pub const TICK_RATE: u32 = (1000 / MOVE_INTERVAL_MS) as u32;
}

/// Simulated player tuning
pub mod bots {
    /// Time between bot decisions in milliseconds
    pub const DECISION_INTERVAL_MS: u64 = 250;
    /// Run from a threat closer than this
    pub const FLEE_RADIUS: f32 = 120.0;
    /// Chase prey closer than this
    pub const CHASE_RADIUS: f32 = 200.0;
    /// Head for food closer than this
    pub const COLLECT_RADIUS: f32 = 300.0;
    /// Chance per decision to pick a new wander heading
    pub const WANDER_TURN_CHANCE: f64 = 0.1;
    /// Chance per decision to split onto nearby prey
    pub const SPLIT_CHANCE: f64 = 0.05;
}

/// Radius of a circle of the given mass
#[inline]
pub fn mass_to_radius(mass: u32) -> f32 {
    (mass as f32).sqrt()
}

/// Maximum distance a circle of the given mass covers in one tick at full speed.
///
/// Larger circles move slower, asymptotically approaching zero, and nothing
/// ever exceeds `2 * BASE_SPEED`.
#[inline]
pub fn max_move_speed(mass: u32) -> f32 {
    2.0 * movement::BASE_SPEED / (1.0 + (mass as f32 / mass::START as f32).sqrt())
}
