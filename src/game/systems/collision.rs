//! Circle overlap and absorption rules

use crate::game::constants::{mass, mass_to_radius};
use crate::game::state::{Entity, EntityId, PlayerId};
use crate::util::vec2::Vec2;

/// Frozen view of an entity taken at the start of a tick
#[derive(Debug, Clone, Copy)]
pub struct EntitySample {
    pub entity_id: EntityId,
    pub position: Vec2,
    pub mass: u32,
    /// `None` for food
    pub owner: Option<PlayerId>,
}

impl From<&Entity> for EntitySample {
    fn from(entity: &Entity) -> Self {
        Self {
            entity_id: entity.entity_id,
            position: entity.position,
            mass: entity.mass,
            owner: entity.owner(),
        }
    }
}

/// Whether two circles overlap.
///
/// They do once the smaller circle's center is inside the larger circle,
/// not merely when the boundaries touch. Symmetric in its arguments.
#[inline]
pub fn overlaps(a_position: Vec2, a_mass: u32, b_position: Vec2, b_mass: u32) -> bool {
    let max_radius = mass_to_radius(a_mass).max(mass_to_radius(b_mass));
    a_position.distance_sq_to(b_position) <= max_radius * max_radius
}

/// Whether a circle of `eater_mass` is heavy enough to absorb a rival of `target_mass`
#[inline]
pub fn can_absorb(eater_mass: u32, target_mass: u32) -> bool {
    (target_mass as f32 / eater_mass as f32) < mass::ABSORB_RATIO
}

/// What an acting circle does to something it overlaps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    EatFood,
    AbsorbCircle,
    Ignore,
}

/// Decide the outcome of `owner`'s circle (currently `running_mass`) touching `other`.
///
/// The caller has already established that the two overlap.
pub fn resolve_contact(owner: PlayerId, running_mass: u32, other: &EntitySample) -> Contact {
    match other.owner {
        None => Contact::EatFood,
        Some(other_owner) if other_owner != owner && can_absorb(running_mass, other.mass) => {
            Contact::AbsorbCircle
        }
        Some(_) => Contact::Ignore,
    }
}
