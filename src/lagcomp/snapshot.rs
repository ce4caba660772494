//! World snapshot data model

use std::time::Duration;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;

/// Identifier of a tracked entity, assigned by the entity store
pub type EntityId = u64;

/// Entity map keyed with FxHasher (small integer keys)
pub type EntityMap = HashMap<EntityId, EntitySnapshot, FxBuildHasher>;

/// One entity's kinematic state at a snapshot's instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl EntitySnapshot {
    pub fn new(id: EntityId, position: Vec2, velocity: Vec2) -> Self {
        Self {
            id,
            position,
            velocity,
        }
    }
}

/// Timestamped capture of every tracked entity at one tick
///
/// Never mutated after it enters the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Time since the compensator clock's epoch
    pub timestamp: Duration,
    /// Assigned by the buffer on insertion, starting at 1
    pub sequence: u64,
    pub entities: EntityMap,
}

impl WorldSnapshot {
    /// Build a snapshot from entity states; the sequence is filled in on record
    pub fn new(timestamp: Duration, entities: impl IntoIterator<Item = EntitySnapshot>) -> Self {
        let entities = entities.into_iter().map(|e| (e.id, e)).collect();
        Self {
            timestamp,
            sequence: 0,
            entities,
        }
    }

    #[inline]
    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.get(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_indexes_entities_by_id() {
        let snapshot = WorldSnapshot::new(
            Duration::from_millis(50),
            [
                EntitySnapshot::new(1, Vec2::new(0.0, 0.0), Vec2::ZERO),
                EntitySnapshot::new(2, Vec2::new(100.0, 100.0), Vec2::new(100.0, 0.0)),
            ],
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.sequence, 0);
        assert_eq!(snapshot.entity(2).unwrap().position, Vec2::new(100.0, 100.0));
        assert!(snapshot.entity(3).is_none());
    }

    #[test]
    fn test_duplicate_ids_keep_last() {
        let snapshot = WorldSnapshot::new(
            Duration::ZERO,
            [
                EntitySnapshot::new(7, Vec2::new(1.0, 1.0), Vec2::ZERO),
                EntitySnapshot::new(7, Vec2::new(2.0, 2.0), Vec2::ZERO),
            ],
        );

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entity(7).unwrap().position, Vec2::new(2.0, 2.0));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = WorldSnapshot::new(Duration::ZERO, []);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_serde_json_roundtrip() {
        let snapshot = WorldSnapshot::new(
            Duration::from_millis(25),
            [EntitySnapshot::new(3, Vec2::new(4.0, 5.0), Vec2::new(-1.0, 0.5))],
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: WorldSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
    }
}
