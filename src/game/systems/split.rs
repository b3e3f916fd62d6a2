//! Splitting a player's circles and merging them back together

use tracing::debug;

use crate::game::constants::{mass_to_radius, max_move_speed, schedule, split};
use crate::game::error::WorldError;
use crate::game::state::{EntityId, PlayerId, Timestamp, WorldState};
use crate::game::systems::collision::overlaps;
use crate::game::systems::spawner::spawn_circle_at;
use crate::util::vec2::Vec2;

/// Split every eligible circle of `player_id` in two.
///
/// The parent keeps the larger half; the new circle is placed just ahead of
/// it along its direction and inherits its movement. Returns the ids of the
/// new circles.
pub fn split_circles(
    state: &mut WorldState,
    player_id: PlayerId,
    now: Timestamp,
) -> Result<Vec<EntityId>, WorldError> {
    let config = *state.config();
    let ids = state.circle_ids_of(player_id);
    let mut owned = ids.len();
    let mut created = Vec::new();

    for id in ids {
        if owned >= split::MAX_CIRCLES_PER_PLAYER {
            break;
        }

        let entity = state.entity_mut(id).ok_or_else(|| {
            WorldError::ConsistencyViolation(format!("circle {} has no entity", id))
        })?;
        if entity.mass < split::MIN_MASS_TO_SPLIT {
            continue;
        }

        let half = entity.mass / 2;
        let kept = entity.mass - half;
        let origin = entity.position;
        entity.mass = kept;
        let circle = entity.circle_mut().ok_or_else(|| {
            WorldError::ConsistencyViolation(format!("entity {} is not a circle", id))
        })?;
        circle.last_split_time = now;
        let (direction, speed) = (circle.direction, circle.speed);

        let heading = if direction.length_sq() > 0.0 {
            direction.normalize()
        } else {
            Vec2::UP
        };
        let offset = heading * (mass_to_radius(kept) + mass_to_radius(half));
        let position = config.clamp_position(origin + offset, half);

        let new_id = spawn_circle_at(state, player_id, half, position, now);
        if let Some(new_circle) = state.entity_mut(new_id).and_then(|e| e.circle_mut()) {
            new_circle.direction = direction;
            new_circle.speed = speed;
        }

        owned += 1;
        created.push(new_id);
    }

    if !created.is_empty() {
        debug!(player_id, new_circles = created.len(), "Player split");
    }
    Ok(created)
}

/// Whether a circle split long enough ago to merge again
#[inline]
pub fn can_recombine(last_split_time: Timestamp, now: Timestamp) -> bool {
    now.saturating_sub(last_split_time) >= split::RECOMBINE_DELAY_MICROS
}

/// Pull each player's recombinable circles together and merge the ones that touch.
///
/// The lowest-id eligible circle is the survivor. A sibling overlapping it is
/// merged in: the survivor takes its mass and moves to the pair's
/// mass-weighted center. A sibling still apart is pulled toward the survivor
/// by at most one second of its full-speed travel. Returns the number of
/// circles merged away.
pub fn recombine_circles(state: &mut WorldState, now: Timestamp) -> Result<usize, WorldError> {
    let config = *state.config();
    let mut player_ids: Vec<PlayerId> = state.players().map(|p| p.player_id).collect();
    player_ids.sort_unstable();

    let mut merged = 0;
    for player_id in player_ids {
        let group: Vec<(EntityId, Vec2, u32)> = state
            .circles_of(player_id)
            .filter(|e| {
                e.circle()
                    .is_some_and(|c| can_recombine(c.last_split_time, now))
            })
            .map(|e| (e.entity_id, e.position, e.mass))
            .collect();
        if group.len() < 2 {
            continue;
        }

        let (survivor, mut center, mut total_mass) = group[0];
        let mut absorbed = 0;
        for &(id, position, m) in &group[1..] {
            if overlaps(center, total_mass, position, m) {
                let combined = total_mass.saturating_add(m);
                center = (center * total_mass as f32 + position * m as f32)
                    * (1.0 / combined as f32);
                total_mass = combined;
                state.remove_entity(id);
                absorbed += 1;
                continue;
            }

            let (heading, distance) = (center - position).normalize_with_length();
            // Stop inside the survivor's rim so the next pass merges
            let gap = distance - 0.5 * mass_to_radius(total_mass).max(mass_to_radius(m));
            let step = (max_move_speed(m) * schedule::TICK_RATE as f32).min(gap);
            let entity = state.entity_mut(id).ok_or_else(|| {
                WorldError::ConsistencyViolation(format!("circle {} has no entity", id))
            })?;
            entity.position = config.clamp_position(position + heading * step, m);
        }

        if absorbed == 0 {
            continue;
        }
        let entity = state.entity_mut(survivor).ok_or_else(|| {
            WorldError::ConsistencyViolation(format!("circle {} has no entity", survivor))
        })?;
        entity.mass = total_mass;
        entity.position = config.clamp_position(center, total_mass);
        merged += absorbed;

        debug!(player_id, survivor, merged = absorbed, "Circles recombined");
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Circle, Player, WorldConfig};
    use uuid::Uuid;

    const NOW: Timestamp = 10_000_000;

    fn state_with_player(player_id: PlayerId) -> WorldState {
        let mut state = WorldState::new(WorldConfig::new(1000));
        state
            .insert_player(Player {
                identity: Uuid::new_v4(),
                player_id,
                name: "Splitter".to_string(),
            })
            .unwrap();
        state
    }

    fn add_circle(
        state: &mut WorldState,
        player_id: PlayerId,
        position: Vec2,
        m: u32,
        t: Timestamp,
    ) -> EntityId {
        state.insert_circle(
            position,
            m,
            Circle {
                player_id,
                direction: Vec2::new(1.0, 0.0),
                speed: 0.7,
                last_split_time: t,
            },
        )
    }

    #[test]
    fn test_split_halves_mass() {
        let mut state = state_with_player(1);
        let id = add_circle(&mut state, 1, Vec2::new(500.0, 500.0), 61, 0);

        let created = split_circles(&mut state, 1, NOW).unwrap();

        assert_eq!(created.len(), 1);
        let original = state.entity(id).unwrap();
        let child = state.entity(created[0]).unwrap();
        assert_eq!(original.mass, 31);
        assert_eq!(child.mass, 30);
        assert_eq!(state.total_mass(1), 61);

        assert!(child.position.x > original.position.x);
        let child_circle = child.circle().unwrap();
        assert_eq!(child_circle.direction, Vec2::new(1.0, 0.0));
        assert_eq!(child_circle.speed, 0.7);
        assert_eq!(child_circle.last_split_time, NOW);
        assert_eq!(original.circle().unwrap().last_split_time, NOW);
    }

    #[test]
    fn test_small_circles_do_not_split() {
        let mut state = state_with_player(1);
        add_circle(&mut state, 1, Vec2::new(500.0, 500.0), split::MIN_MASS_TO_SPLIT - 1, 0);

        let created = split_circles(&mut state, 1, NOW).unwrap();

        assert!(created.is_empty());
        assert_eq!(state.circle_count(), 1);
    }

    #[test]
    fn test_split_respects_circle_cap() {
        let mut state = state_with_player(1);
        for i in 0..(split::MAX_CIRCLES_PER_PLAYER - 1) {
            add_circle(&mut state, 1, Vec2::new(100.0 + 40.0 * i as f32, 500.0), 100, 0);
        }

        let created = split_circles(&mut state, 1, NOW).unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(state.circle_ids_of(1).len(), split::MAX_CIRCLES_PER_PLAYER);
    }

    #[test]
    fn test_split_near_wall_stays_in_bounds() {
        let mut state = state_with_player(1);
        add_circle(&mut state, 1, Vec2::new(990.0, 500.0), 100, 0);

        let created = split_circles(&mut state, 1, NOW).unwrap();

        let child = state.entity(created[0]).unwrap();
        assert!(state.config().in_bounds(child.position, child.mass));
    }

    #[test]
    fn test_recombine_waits_for_delay() {
        let mut state = state_with_player(1);
        add_circle(&mut state, 1, Vec2::new(100.0, 100.0), 30, NOW);
        let sibling = add_circle(&mut state, 1, Vec2::new(105.0, 100.0), 30, NOW);

        let early = NOW + split::RECOMBINE_DELAY_MICROS - 1;
        let merged = recombine_circles(&mut state, early).unwrap();
        assert_eq!(merged, 0);
        assert_eq!(state.circle_count(), 2);
        assert_eq!(state.entity(sibling).unwrap().position, Vec2::new(105.0, 100.0));

        let merged = recombine_circles(&mut state, NOW + split::RECOMBINE_DELAY_MICROS).unwrap();
        assert_eq!(merged, 1);
        assert_eq!(state.circle_count(), 1);
    }

    #[test]
    fn test_recombine_conserves_mass_and_centers() {
        let mut state = state_with_player(1);
        let first = add_circle(&mut state, 1, Vec2::new(100.0, 100.0), 10, 0);
        add_circle(&mut state, 1, Vec2::new(103.0, 100.0), 20, 0);

        assert_eq!(recombine_circles(&mut state, NOW).unwrap(), 1);

        let survivor = state.entity(first).unwrap();
        assert_eq!(survivor.mass, 30);
        assert!((survivor.position.x - 102.0).abs() < 1e-3);
        assert!((survivor.position.y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_recombine_pulls_distant_siblings_in() {
        let mut state = state_with_player(1);
        let first = add_circle(&mut state, 1, Vec2::new(100.0, 100.0), 10, 0);
        let far = add_circle(&mut state, 1, Vec2::new(400.0, 100.0), 20, 0);

        assert_eq!(recombine_circles(&mut state, NOW).unwrap(), 0);
        let pulled = state.entity(far).unwrap().position;
        let reach = max_move_speed(20) * schedule::TICK_RATE as f32;
        assert!((pulled.x - (400.0 - reach)).abs() < 1e-3);
        assert_eq!(pulled.y, 100.0);
        assert_eq!(state.entity(first).unwrap().position, Vec2::new(100.0, 100.0));

        let mut passes = 1;
        while state.circle_count() > 1 {
            assert!(passes < 10, "siblings never merged");
            recombine_circles(&mut state, NOW).unwrap();
            passes += 1;
        }

        // Merged where the survivor was, not halfway across the arena
        let survivor = state.entity(first).unwrap();
        assert_eq!(survivor.mass, 30);
        assert!(survivor.position.x < 105.0);
        assert_eq!(state.total_mass(1), 30);
    }

    #[test]
    fn test_recombine_leaves_other_players_alone() {
        let mut state = state_with_player(1);
        state
            .insert_player(Player {
                identity: Uuid::new_v4(),
                player_id: 2,
                name: String::new(),
            })
            .unwrap();
        add_circle(&mut state, 1, Vec2::new(100.0, 100.0), 30, 0);
        add_circle(&mut state, 2, Vec2::new(100.0, 100.0), 30, 0);

        assert_eq!(recombine_circles(&mut state, NOW).unwrap(), 0);
        assert_eq!(state.circle_count(), 2);
    }
}
