//! Player lifecycle
//!
//! Connect, disconnect, entering the game and steering. A player moves
//! between the live and logged-out tables but keeps its `player_id` and name
//! for as long as the world exists.
//!
//! Every function here expects to run inside [`WorldState::atomically`]; an
//! error may leave the working copy half-updated.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::game::error::WorldError;
use crate::game::state::{EntityId, Identity, Player, PlayerId, Timestamp, WorldState};
use crate::game::systems::{spawner, split};
use crate::util::vec2::Vec2;

/// Read-only summary of one live player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: PlayerId,
    pub name: String,
    pub circle_count: usize,
    pub total_mass: u64,
    /// `None` while the player has no circles
    pub center_of_mass: Option<Vec2>,
}

fn require_player(state: &WorldState, identity: Identity) -> Result<&Player, WorldError> {
    state
        .player(identity)
        .ok_or(WorldError::PlayerNotFound(identity))
}

/// Open a session: restore an archived player or create a fresh one
pub fn connect(state: &mut WorldState, identity: Identity) -> Result<PlayerId, WorldError> {
    if let Some(player) = state.remove_logged_out_player(identity) {
        let player_id = player.player_id;
        info!(%identity, player_id, name = %player.name, "Player reconnected");
        state.insert_player(player)?;
        return Ok(player_id);
    }

    if state.player(identity).is_some() {
        return Err(WorldError::ConsistencyViolation(format!(
            "identity {} connected twice",
            identity
        )));
    }

    let player_id = state.alloc_player_id();
    state.insert_player(Player {
        identity,
        player_id,
        name: String::new(),
    })?;
    info!(%identity, player_id, "Player connected");
    Ok(player_id)
}

/// Close a session: delete the player's circles and archive the record
pub fn disconnect(state: &mut WorldState, identity: Identity) -> Result<(), WorldError> {
    let player_id = require_player(state, identity)?.player_id;

    let circles = state.circle_ids_of(player_id);
    for id in &circles {
        state.remove_entity(*id);
    }

    let player = state
        .remove_player(identity)
        .ok_or(WorldError::PlayerNotFound(identity))?;
    state.insert_logged_out_player(player)?;
    info!(%identity, player_id, removed_circles = circles.len(), "Player disconnected");
    Ok(())
}

/// Name the player and give it a starting circle
pub fn enter_game<R: Rng + ?Sized>(
    state: &mut WorldState,
    identity: Identity,
    name: &str,
    now: Timestamp,
    rng: &mut R,
) -> Result<EntityId, WorldError> {
    let player = state
        .player_mut(identity)
        .ok_or(WorldError::PlayerNotFound(identity))?;
    player.name = name.to_string();
    let player_id = player.player_id;

    let entity_id = spawner::spawn_player_initial_circle(state, player_id, now, rng);
    info!(%identity, player_id, name, entity_id, "Player entered the game");
    Ok(entity_id)
}

/// Steer every circle of the player.
///
/// The vector's direction becomes the circles' direction and its magnitude,
/// clamped to [0, 1], their speed. Returns the number of circles updated.
pub fn update_player_input(
    state: &mut WorldState,
    identity: Identity,
    direction: Vec2,
) -> Result<usize, WorldError> {
    let player_id = require_player(state, identity)?.player_id;
    let (unit, magnitude) = direction.finite_or_zero().normalize_with_length();
    let speed = magnitude.clamp(0.0, 1.0);

    let ids = state.circle_ids_of(player_id);
    for id in &ids {
        let circle = state
            .entity_mut(*id)
            .and_then(|e| e.circle_mut())
            .ok_or_else(|| {
                WorldError::ConsistencyViolation(format!("circle {} has no entity", id))
            })?;
        circle.direction = unit;
        circle.speed = speed;
    }
    Ok(ids.len())
}

/// Give a player with no circles left a new starting circle
pub fn respawn<R: Rng + ?Sized>(
    state: &mut WorldState,
    identity: Identity,
    now: Timestamp,
    rng: &mut R,
) -> Result<EntityId, WorldError> {
    let player_id = require_player(state, identity)?.player_id;
    if state.circles_of(player_id).next().is_some() {
        return Err(WorldError::AlreadyAlive(identity));
    }

    let entity_id = spawner::spawn_player_initial_circle(state, player_id, now, rng);
    debug!(%identity, player_id, entity_id, "Player respawned");
    Ok(entity_id)
}

/// Delete every circle the player owns, keeping the session
pub fn suicide(state: &mut WorldState, identity: Identity) -> Result<usize, WorldError> {
    let player_id = require_player(state, identity)?.player_id;
    let ids = state.circle_ids_of(player_id);
    for id in &ids {
        state.remove_entity(*id);
    }
    debug!(%identity, player_id, removed = ids.len(), "Player suicided");
    Ok(ids.len())
}

/// Split the player's circles
pub fn player_split(
    state: &mut WorldState,
    identity: Identity,
    now: Timestamp,
) -> Result<Vec<EntityId>, WorldError> {
    let player_id = require_player(state, identity)?.player_id;
    split::split_circles(state, player_id, now)
}

/// Summarize a live player's circles
pub fn player_stats(state: &WorldState, identity: Identity) -> Result<PlayerStats, WorldError> {
    let player = require_player(state, identity)?;
    let player_id = player.player_id;
    Ok(PlayerStats {
        player_id,
        name: player.name.clone(),
        circle_count: state.circles_of(player_id).count(),
        total_mass: state.total_mass(player_id),
        center_of_mass: state.center_of_mass(player_id),
    })
}
