//! Movement and collision tick
//!
//! Each tick every circle, in ascending entity id order, moves along its
//! direction and then scans the rest of the world for things to eat.
//! Positions and masses of other entities come from a snapshot taken when the
//! tick starts; only the acting circle's own mass grows during its scan, so
//! several absorptions in one tick compound.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::trace;

use crate::game::constants::max_move_speed;
use crate::game::error::WorldError;
use crate::game::state::{Circle, EntityId, WorldConfig, WorldState};
use crate::game::systems::collision::{overlaps, resolve_contact, Contact, EntitySample};
use crate::util::vec2::Vec2;

/// What happened during one movement tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub circles_moved: usize,
    pub food_eaten: usize,
    pub circles_absorbed: usize,
    pub mass_absorbed: u64,
}

/// Position after one tick of movement, clamped to the arena
pub fn integrate(config: &WorldConfig, position: Vec2, mass: u32, circle: &Circle) -> Vec2 {
    let step = circle.direction * (circle.speed * max_move_speed(mass));
    config.clamp_position(position + step, mass)
}

/// Move every circle and resolve what it eats
pub fn move_all_players(state: &mut WorldState) -> Result<TickReport, WorldError> {
    let config = *state.config();
    let samples: Vec<EntitySample> = state.entities().map(EntitySample::from).collect();
    let mut consumed: FxHashSet<EntityId> = FxHashSet::default();
    let mut report = TickReport::default();

    for circle_id in state.circle_ids() {
        // Eaten earlier this tick
        if consumed.contains(&circle_id) {
            continue;
        }

        let entity = state.entity(circle_id).ok_or_else(|| {
            WorldError::ConsistencyViolation(format!("circle {} has no entity", circle_id))
        })?;
        let circle = *entity.circle().ok_or_else(|| {
            WorldError::ConsistencyViolation(format!("entity {} is not a circle", circle_id))
        })?;

        // Bounds use the mass from before this tick's absorptions
        let position = integrate(&config, entity.position, entity.mass, &circle);
        debug_assert!(config.in_bounds(position, entity.mass));
        let mut running_mass = entity.mass;
        let mut eaten: SmallVec<[EntityId; 8]> = SmallVec::new();

        for other in &samples {
            if other.entity_id == circle_id || consumed.contains(&other.entity_id) {
                continue;
            }
            if !overlaps(position, running_mass, other.position, other.mass) {
                continue;
            }

            let contact = resolve_contact(circle.player_id, running_mass, other);
            if contact == Contact::Ignore {
                continue;
            }

            // Transfer what the victim holds now, which may exceed its tick-start mass
            // if it already ate this tick.
            let gained = state
                .entity(other.entity_id)
                .map(|e| e.mass)
                .ok_or_else(|| {
                    WorldError::ConsistencyViolation(format!(
                        "entity {} vanished mid-tick",
                        other.entity_id
                    ))
                })?;
            running_mass = running_mass.saturating_add(gained);
            consumed.insert(other.entity_id);
            eaten.push(other.entity_id);

            match contact {
                Contact::EatFood => report.food_eaten += 1,
                Contact::AbsorbCircle => {
                    report.circles_absorbed += 1;
                    trace!(
                        eater = circle_id,
                        victim = other.entity_id,
                        mass = gained,
                        "Circle absorbed"
                    );
                }
                Contact::Ignore => {}
            }
            report.mass_absorbed += gained as u64;
        }

        for id in eaten {
            state.remove_entity(id);
        }

        let entity = state.entity_mut(circle_id).ok_or_else(|| {
            WorldError::ConsistencyViolation(format!("circle {} has no entity", circle_id))
        })?;
        entity.position = position;
        entity.mass = running_mass;
        report.circles_moved += 1;
    }

    state.move_tick += 1;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::{mass, mass_to_radius, movement};
    use crate::game::state::EntityKind;

    fn world() -> WorldState {
        WorldState::new(WorldConfig::new(1000))
    }

    fn add_circle(
        state: &mut WorldState,
        player_id: u32,
        position: Vec2,
        circle_mass: u32,
        direction: Vec2,
        speed: f32,
    ) -> EntityId {
        state.insert_circle(
            position,
            circle_mass,
            Circle {
                player_id,
                direction,
                speed,
                last_split_time: 0,
            },
        )
    }

    #[test]
    fn test_zero_speed_leaves_position_unchanged() {
        let mut state = world();
        let id = add_circle(&mut state, 1, Vec2::new(250.0, 700.0), mass::START, Vec2::UP, 0.0);

        move_all_players(&mut state).unwrap();

        assert_eq!(state.entity(id).unwrap().position, Vec2::new(250.0, 700.0));
        assert_eq!(state.move_tick, 1);
    }

    #[test]
    fn test_full_speed_moves_max_speed() {
        let mut state = world();
        let id = add_circle(
            &mut state,
            1,
            Vec2::new(500.0, 500.0),
            mass::START,
            Vec2::new(1.0, 0.0),
            1.0,
        );

        move_all_players(&mut state).unwrap();

        let pos = state.entity(id).unwrap().position;
        assert!((pos.x - (500.0 + movement::BASE_SPEED)).abs() < 1e-3);
        assert!((pos.y - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_half_speed_moves_half_as_far() {
        let mut state = world();
        let id = add_circle(
            &mut state,
            1,
            Vec2::new(500.0, 500.0),
            60,
            Vec2::new(0.0, -1.0),
            0.5,
        );

        move_all_players(&mut state).unwrap();

        let expected = 500.0 - 0.5 * max_move_speed(60);
        assert!((state.entity(id).unwrap().position.y - expected).abs() < 1e-3);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let mut state = world();
        let radius = mass_to_radius(mass::START);
        let id = add_circle(
            &mut state,
            1,
            Vec2::new(2.0, 500.0),
            mass::START,
            Vec2::new(1.0, 0.0),
            1.0,
        );

        move_all_players(&mut state).unwrap();
        let pos = state.entity(id).unwrap().position;
        assert!(pos.x >= radius);

        // Pushing into the far wall stops at world_size - radius
        let id = add_circle(
            &mut state,
            2,
            Vec2::new(995.0, 100.0),
            mass::START,
            Vec2::new(1.0, 0.0),
            1.0,
        );
        move_all_players(&mut state).unwrap();
        let pos = state.entity(id).unwrap().position;
        assert!((pos.x - (1000.0 - radius)).abs() < 1e-3);
    }

    #[test]
    fn test_eats_food_and_conserves_mass() {
        let mut state = world();
        let id = add_circle(&mut state, 1, Vec2::new(100.0, 100.0), mass::START, Vec2::UP, 0.0);
        let food = state.insert_food(Vec2::new(102.0, 101.0), 3);

        let report = move_all_players(&mut state).unwrap();

        assert_eq!(state.entity(id).unwrap().mass, mass::START + 3);
        assert!(state.entity(food).is_none());
        assert_eq!(state.food_count(), 0);
        assert_eq!(report.food_eaten, 1);
        assert_eq!(report.mass_absorbed, 3);
    }

    #[test]
    fn test_distant_food_untouched() {
        let mut state = world();
        add_circle(&mut state, 1, Vec2::new(100.0, 100.0), mass::START, Vec2::UP, 0.0);
        let food = state.insert_food(Vec2::new(110.0, 100.0), 3);

        move_all_players(&mut state).unwrap();

        assert!(state.entity(food).is_some());
    }

    #[test]
    fn test_absorbs_smaller_rival() {
        let mut state = world();
        let big = add_circle(&mut state, 1, Vec2::new(300.0, 300.0), 100, Vec2::UP, 0.0);
        let small = add_circle(&mut state, 2, Vec2::new(305.0, 300.0), 80, Vec2::UP, 0.0);

        let report = move_all_players(&mut state).unwrap();

        assert_eq!(state.entity(big).unwrap().mass, 180);
        assert!(state.entity(small).is_none());
        assert_eq!(state.circle_count(), 1);
        assert_eq!(report.circles_absorbed, 1);
    }

    #[test]
    fn test_smaller_acting_first_is_still_eaten() {
        let mut state = world();
        let small = add_circle(&mut state, 2, Vec2::new(305.0, 300.0), 80, Vec2::UP, 0.0);
        let big = add_circle(&mut state, 1, Vec2::new(300.0, 300.0), 100, Vec2::UP, 0.0);

        move_all_players(&mut state).unwrap();

        assert!(state.entity(small).is_none());
        assert_eq!(state.entity(big).unwrap().mass, 180);
    }

    #[test]
    fn test_near_equal_rivals_coexist() {
        let mut state = world();
        let a = add_circle(&mut state, 1, Vec2::new(300.0, 300.0), 100, Vec2::UP, 0.0);
        let b = add_circle(&mut state, 2, Vec2::new(301.0, 300.0), 90, Vec2::UP, 0.0);
        let c = add_circle(&mut state, 3, Vec2::new(600.0, 600.0), 50, Vec2::UP, 0.0);
        let d = add_circle(&mut state, 4, Vec2::new(600.0, 601.0), 50, Vec2::UP, 0.0);

        move_all_players(&mut state).unwrap();

        for id in [a, b, c, d] {
            assert!(state.entity(id).is_some());
        }
        assert_eq!(state.entity(a).unwrap().mass, 100);
        assert_eq!(state.entity(c).unwrap().mass, 50);
    }

    #[test]
    fn test_own_circles_never_absorb() {
        let mut state = world();
        let a = add_circle(&mut state, 1, Vec2::new(300.0, 300.0), 100, Vec2::UP, 0.0);
        let b = add_circle(&mut state, 1, Vec2::new(302.0, 300.0), 10, Vec2::UP, 0.0);

        move_all_players(&mut state).unwrap();

        assert_eq!(state.entity(a).unwrap().mass, 100);
        assert_eq!(state.entity(b).unwrap().mass, 10);
    }

    #[test]
    fn test_absorptions_compound_within_tick() {
        let mut state = world();
        // radius sqrt(15) ~ 3.87
        let id = add_circle(&mut state, 1, Vec2::new(100.0, 100.0), mass::START, Vec2::UP, 0.0);
        // Inside the starting radius
        state.insert_food(Vec2::new(103.0, 100.0), 4);
        // 4.2 away: only reachable once the circle has grown to mass 19 (radius ~4.36)
        state.insert_food(Vec2::new(100.0, 104.2), 2);

        move_all_players(&mut state).unwrap();

        assert_eq!(state.entity(id).unwrap().mass, mass::START + 4 + 2);
        assert_eq!(state.food_count(), 0);
    }

    #[test]
    fn test_growth_mid_scan_unlocks_rival() {
        let mut state = world();
        let hunter = add_circle(&mut state, 1, Vec2::new(400.0, 400.0), 100, Vec2::UP, 0.0);
        // Food scanned before the rival: 100 + 10 = 110, and 90 / 110 < 0.85
        for _ in 0..5 {
            state.insert_food(Vec2::new(401.0, 400.0), 2);
        }
        let rival = add_circle(&mut state, 2, Vec2::new(402.0, 400.0), 90, Vec2::UP, 0.0);

        move_all_players(&mut state).unwrap();

        assert!(state.entity(rival).is_none());
        assert_eq!(state.entity(hunter).unwrap().mass, 200);
    }

    #[test]
    fn test_total_mass_conserved() {
        let mut state = world();
        add_circle(&mut state, 1, Vec2::new(400.0, 400.0), 100, Vec2::new(1.0, 0.0), 1.0);
        add_circle(&mut state, 2, Vec2::new(405.0, 400.0), 40, Vec2::new(-1.0, 0.0), 1.0);
        add_circle(&mut state, 3, Vec2::new(395.0, 402.0), 30, Vec2::new(0.0, 1.0), 0.3);
        for i in 0..20 {
            state.insert_food(Vec2::new(390.0 + i as f32, 400.0), 2);
        }
        let before: u64 = state.entities().map(|e| e.mass as u64).sum();

        for _ in 0..5 {
            move_all_players(&mut state).unwrap();
        }

        let after: u64 = state.entities().map(|e| e.mass as u64).sum();
        assert_eq!(before, after);
    }

    #[test]
    fn test_positions_stay_in_bounds() {
        let mut state = world();
        let dirs = [
            Vec2::new(1.0, 0.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(0.0, -1.0),
        ];
        for (i, dir) in dirs.iter().enumerate() {
            add_circle(
                &mut state,
                i as u32 + 1,
                Vec2::new(100.0 + 200.0 * i as f32, 500.0),
                mass::START,
                *dir,
                1.0,
            );
        }

        for _ in 0..200 {
            move_all_players(&mut state).unwrap();
        }

        let config = *state.config();
        for entity in state.entities() {
            assert!(config.in_bounds(entity.position, entity.mass));
        }
    }

    #[test]
    fn test_food_does_not_move() {
        let mut state = world();
        let food = state.insert_food(Vec2::new(10.0, 10.0), 2);
        move_all_players(&mut state).unwrap();
        let entity = state.entity(food).unwrap();
        assert_eq!(entity.position, Vec2::new(10.0, 10.0));
        assert_eq!(entity.kind, EntityKind::Food);
    }
}
