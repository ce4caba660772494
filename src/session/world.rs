//! Simulated entity world feeding the demo session
//!
//! Stands in for the real entity/component store: entities drift around a
//! square arena, bounce off its walls and occasionally change heading.

use rand::Rng;

use crate::lagcomp::{EntityId, EntitySnapshot};
use crate::util::vec2::Vec2;

/// Half-width of the square arena in world units
pub const ARENA_HALF_SIZE: f32 = 500.0;
/// Maximum entity speed in units per second
pub const MAX_SPEED: f32 = 150.0;
/// Chance per tick that an entity picks a new velocity
const TURN_CHANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
struct SimEntity {
    id: EntityId,
    position: Vec2,
    velocity: Vec2,
}

pub struct SimulatedWorld {
    entities: Vec<SimEntity>,
}

impl SimulatedWorld {
    /// Spawn `count` entities with ids `1..=count` at random positions
    pub fn new<R: Rng>(count: usize, rng: &mut R) -> Self {
        let entities = (1..=count as EntityId)
            .map(|id| SimEntity {
                id,
                position: random_position(rng),
                velocity: random_velocity(rng),
            })
            .collect();
        Self { entities }
    }

    /// Advance every entity by `dt` seconds
    pub fn step<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        for entity in &mut self.entities {
            if rng.gen_bool(TURN_CHANCE) {
                entity.velocity = random_velocity(rng);
            }

            entity.position += entity.velocity * dt;

            if entity.position.x.abs() > ARENA_HALF_SIZE {
                entity.position.x = entity.position.x.clamp(-ARENA_HALF_SIZE, ARENA_HALF_SIZE);
                entity.velocity.x = -entity.velocity.x;
            }
            if entity.position.y.abs() > ARENA_HALF_SIZE {
                entity.position.y = entity.position.y.clamp(-ARENA_HALF_SIZE, ARENA_HALF_SIZE);
                entity.velocity.y = -entity.velocity.y;
            }
        }
    }

    /// Kinematic state of every entity for this tick
    pub fn snapshots(&self) -> impl Iterator<Item = EntitySnapshot> + '_ {
        self.entities
            .iter()
            .map(|e| EntitySnapshot::new(e.id, e.position, e.velocity))
    }
}

fn random_position<R: Rng>(rng: &mut R) -> Vec2 {
    Vec2::new(
        rng.gen_range(-ARENA_HALF_SIZE..ARENA_HALF_SIZE),
        rng.gen_range(-ARENA_HALF_SIZE..ARENA_HALF_SIZE),
    )
}

fn random_velocity<R: Rng>(rng: &mut R) -> Vec2 {
    Vec2::new(
        rng.gen_range(-MAX_SPEED..MAX_SPEED),
        rng.gen_range(-MAX_SPEED..MAX_SPEED),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_spawn_assigns_sequential_ids() {
        let mut rng = StdRng::seed_from_u64(7);
        let world = SimulatedWorld::new(5, &mut rng);

        let ids: Vec<EntityId> = world.snapshots().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_entities_stay_in_arena() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut world = SimulatedWorld::new(32, &mut rng);

        for _ in 0..2000 {
            world.step(0.05, &mut rng);
        }

        for e in world.snapshots() {
            assert!(e.position.x.abs() <= ARENA_HALF_SIZE);
            assert!(e.position.y.abs() <= ARENA_HALF_SIZE);
            assert!(e.position.is_finite());
        }
    }

    #[test]
    fn test_step_moves_entities() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut world = SimulatedWorld::new(8, &mut rng);
        let before: Vec<Vec2> = world.snapshots().map(|e| e.position).collect();

        world.step(0.05, &mut rng);

        let after: Vec<Vec2> = world.snapshots().map(|e| e.position).collect();
        assert_ne!(before, after);
    }

    #[test]
    fn test_seeded_worlds_are_reproducible() {
        let mut a_rng = StdRng::seed_from_u64(99);
        let mut b_rng = StdRng::seed_from_u64(99);
        let mut a = SimulatedWorld::new(4, &mut a_rng);
        let mut b = SimulatedWorld::new(4, &mut b_rng);

        for _ in 0..10 {
            a.step(0.05, &mut a_rng);
            b.step(0.05, &mut b_rng);
        }

        let a_states: Vec<EntitySnapshot> = a.snapshots().collect();
        let b_states: Vec<EntitySnapshot> = b.snapshots().collect();
        assert_eq!(a_states, b_states);
    }
}
