//! World store
//!
//! The authoritative tables every action reads and mutates: entities (food and
//! player circles), live players and logged-out players, plus the immutable
//! world configuration. Nothing outside this store survives between actions.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::{mass_to_radius, world};
use crate::game::error::WorldError;
use crate::util::vec2::Vec2;

/// External principal that owns a session
pub type Identity = Uuid;

/// Server-assigned player identifier
pub type PlayerId = u32;

/// Server-assigned entity identifier
pub type EntityId = u32;

/// Microseconds since the Unix epoch
pub type Timestamp = u64;

/// World configuration, fixed once the world is initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Side length of the square arena
    pub world_size: u64,
}

impl WorldConfig {
    pub fn new(world_size: u64) -> Self {
        Self { world_size }
    }

    /// Valid range for either coordinate of a circle with the given mass.
    ///
    /// A circle too large to fit is pinned to the arena center.
    pub fn axis_bounds(&self, mass: u32) -> (f32, f32) {
        let radius = mass_to_radius(mass);
        let size = self.world_size as f32;
        if radius * 2.0 >= size {
            (size / 2.0, size / 2.0)
        } else {
            (radius, size - radius)
        }
    }

    /// Clamp a position into the valid bounds for the given mass
    pub fn clamp_position(&self, position: Vec2, mass: u32) -> Vec2 {
        let (min, max) = self.axis_bounds(mass);
        position.clamp_axes(min, max)
    }

    /// Whether a position lies within the valid bounds for the given mass
    pub fn in_bounds(&self, position: Vec2, mass: u32) -> bool {
        let (min, max) = self.axis_bounds(mass);
        (min..=max).contains(&position.x) && (min..=max).contains(&position.y)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::new(world::DEFAULT_SIZE)
    }
}

/// Movement intent and ownership of a player circle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub player_id: PlayerId,
    /// Unit vector, or zero when the player has no input
    pub direction: Vec2,
    /// Fraction of max speed, in [0, 1]
    pub speed: f32,
    pub last_split_time: Timestamp,
}

/// What an entity is
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    Food,
    Circle(Circle),
}

/// A positioned, massed circle in the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub position: Vec2,
    pub mass: u32,
    pub kind: EntityKind,
}

impl Entity {
    pub fn radius(&self) -> f32 {
        mass_to_radius(self.mass)
    }

    pub fn is_food(&self) -> bool {
        matches!(self.kind, EntityKind::Food)
    }

    pub fn circle(&self) -> Option<&Circle> {
        match &self.kind {
            EntityKind::Circle(circle) => Some(circle),
            EntityKind::Food => None,
        }
    }

    pub fn circle_mut(&mut self) -> Option<&mut Circle> {
        match &mut self.kind {
            EntityKind::Circle(circle) => Some(circle),
            EntityKind::Food => None,
        }
    }

    /// Owning player, for circles
    pub fn owner(&self) -> Option<PlayerId> {
        self.circle().map(|c| c.player_id)
    }
}

/// A player session record (live or logged out)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub identity: Identity,
    pub player_id: PlayerId,
    pub name: String,
}

/// Externally visible tables, as handed to viewers.
///
/// Logged-out players are deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub move_tick: u64,
    pub config: WorldConfig,
    pub entities: Vec<Entity>,
    pub players: Vec<Player>,
}

/// Complete world state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    config: WorldConfig,
    /// Ordered by id so every scan visits entities in the same order
    entities: BTreeMap<EntityId, Entity>,
    players: HashMap<Identity, Player>,
    logged_out_players: HashMap<Identity, Player>,
    food_count: usize,
    /// Number of completed movement ticks
    pub move_tick: u64,
    next_entity_id: EntityId,
    next_player_id: PlayerId,
}

impl WorldState {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            players: HashMap::new(),
            logged_out_players: HashMap::new(),
            food_count: 0,
            move_tick: 0,
            next_entity_id: 1,
            next_player_id: 1,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Run `f` as one indivisible action.
    ///
    /// `f` works on a copy of the store; the copy replaces the store only when
    /// `f` succeeds, so an aborted action leaves no trace.
    pub fn atomically<T, F>(&mut self, f: F) -> Result<T, WorldError>
    where
        F: FnOnce(&mut WorldState) -> Result<T, WorldError>,
    {
        let mut working = self.clone();
        let out = f(&mut working)?;
        *self = working;
        Ok(out)
    }

    // === Entities ===

    /// Generate a new unique entity ID
    pub fn alloc_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// All entities in ascending id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn insert_food(&mut self, position: Vec2, mass: u32) -> EntityId {
        let entity_id = self.alloc_entity_id();
        self.entities.insert(
            entity_id,
            Entity {
                entity_id,
                position,
                mass,
                kind: EntityKind::Food,
            },
        );
        self.food_count += 1;
        entity_id
    }

    pub fn insert_circle(&mut self, position: Vec2, mass: u32, circle: Circle) -> EntityId {
        let entity_id = self.alloc_entity_id();
        self.entities.insert(
            entity_id,
            Entity {
                entity_id,
                position,
                mass,
                kind: EntityKind::Circle(circle),
            },
        );
        entity_id
    }

    /// Remove an entity of either kind
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let removed = self.entities.remove(&id)?;
        if removed.is_food() {
            self.food_count -= 1;
        }
        Some(removed)
    }

    pub fn food_count(&self) -> usize {
        self.food_count
    }

    pub fn circle_count(&self) -> usize {
        self.entities.len() - self.food_count
    }

    /// Ids of every circle in ascending order
    pub fn circle_ids(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| !e.is_food())
            .map(|e| e.entity_id)
            .collect()
    }

    /// Circles owned by a player, in ascending id order
    pub fn circles_of(&self, player_id: PlayerId) -> impl Iterator<Item = &Entity> {
        self.entities
            .values()
            .filter(move |e| e.owner() == Some(player_id))
    }

    pub fn circle_ids_of(&self, player_id: PlayerId) -> Vec<EntityId> {
        self.circles_of(player_id).map(|e| e.entity_id).collect()
    }

    /// Combined mass of a player's circles
    pub fn total_mass(&self, player_id: PlayerId) -> u64 {
        self.circles_of(player_id).map(|e| e.mass as u64).sum()
    }

    /// Mass-weighted mean position of a player's circles
    pub fn center_of_mass(&self, player_id: PlayerId) -> Option<Vec2> {
        let mut weighted = Vec2::ZERO;
        let mut total = 0.0f32;
        for entity in self.circles_of(player_id) {
            weighted += entity.position * entity.mass as f32;
            total += entity.mass as f32;
        }
        if total > 0.0 {
            Some(weighted * (1.0 / total))
        } else {
            None
        }
    }

    // === Players ===

    /// Generate a new unique player ID
    pub fn alloc_player_id(&mut self) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        id
    }

    pub fn player(&self, identity: Identity) -> Option<&Player> {
        self.players.get(&identity)
    }

    pub fn player_mut(&mut self, identity: Identity) -> Option<&mut Player> {
        self.players.get_mut(&identity)
    }

    pub fn player_by_id(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.values().find(|p| p.player_id == player_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Insert a live player.
    ///
    /// Fails if the identity already has a live or logged-out record, or the
    /// player id is already taken.
    pub fn insert_player(&mut self, player: Player) -> Result<(), WorldError> {
        if self.players.contains_key(&player.identity)
            || self.logged_out_players.contains_key(&player.identity)
        {
            return Err(WorldError::ConsistencyViolation(format!(
                "identity {} already has a player record",
                player.identity
            )));
        }
        if self.player_by_id(player.player_id).is_some() {
            return Err(WorldError::ConsistencyViolation(format!(
                "player id {} already in use",
                player.player_id
            )));
        }
        self.players.insert(player.identity, player);
        Ok(())
    }

    pub fn remove_player(&mut self, identity: Identity) -> Option<Player> {
        self.players.remove(&identity)
    }

    // === Logged-out players ===

    pub fn logged_out_player(&self, identity: Identity) -> Option<&Player> {
        self.logged_out_players.get(&identity)
    }

    pub fn logged_out_count(&self) -> usize {
        self.logged_out_players.len()
    }

    /// Archive a player record; the identity must not be live at the same time
    pub fn insert_logged_out_player(&mut self, player: Player) -> Result<(), WorldError> {
        if self.players.contains_key(&player.identity)
            || self.logged_out_players.contains_key(&player.identity)
        {
            return Err(WorldError::ConsistencyViolation(format!(
                "identity {} already has a player record",
                player.identity
            )));
        }
        self.logged_out_players.insert(player.identity, player);
        Ok(())
    }

    pub fn remove_logged_out_player(&mut self, identity: Identity) -> Option<Player> {
        self.logged_out_players.remove(&identity)
    }

    /// Copy of the externally visible tables
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|p| p.player_id);
        WorldSnapshot {
            move_tick: self.move_tick,
            config: self.config,
            entities: self.entities.values().cloned().collect(),
            players,
        }
    }
}
