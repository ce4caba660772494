//! Rewind math: latency clamping and bracket interpolation
//!
//! Pure functions over snapshots. The compensator feeds them brackets pulled
//! from the buffer under a read lock and then releases the lock, so none of
//! this runs while the writer is blocked.

use std::sync::Arc;
use std::time::Duration;

use super::buffer::Bracket;
use super::snapshot::{EntityId, EntityMap, EntitySnapshot, WorldSnapshot};
use crate::config::CompensationConfig;

/// Rewind failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewindError {
    #[error("no snapshots available")]
    NoSnapshots,
    #[error("entity {0} not found in reconstructed history")]
    EntityNotFound(EntityId),
}

/// Reconstructed world state as a player saw it
#[derive(Debug, Clone)]
pub struct RewindResult {
    /// Stored snapshot returned verbatim, or a synthetic interpolated one
    pub snapshot: Arc<WorldSnapshot>,
    /// Server time the rewind targeted (`now - actual_latency`)
    pub compensated_time: Duration,
    /// Latency actually applied after clamping
    pub actual_latency: Duration,
    /// Requested latency fell outside `[min, max]` compensation
    pub was_clamped: bool,
    /// Target time fell outside the buffered history
    pub history_clamped: bool,
}

/// Clamped latency and whether clamping occurred
///
/// Zero latency means "no compensation" and is never raised to the floor.
pub fn clamp_latency(latency: Duration, config: &CompensationConfig) -> (Duration, bool) {
    if latency.is_zero() {
        return (Duration::ZERO, false);
    }
    if latency > config.max_compensation {
        return (config.max_compensation, true);
    }
    if latency < config.min_compensation {
        return (config.min_compensation, true);
    }
    (latency, false)
}

/// Position of `t` between two timestamps, in `[0, 1]`
///
/// A zero-width interval yields 0.
pub fn interpolation_factor(start: Duration, end: Duration, t: Duration) -> f32 {
    let span = end.saturating_sub(start);
    if span.is_zero() {
        return 0.0;
    }
    let elapsed = t.saturating_sub(start);
    let f = elapsed.as_secs_f64() / span.as_secs_f64();
    f.clamp(0.0, 1.0) as f32
}

/// Interpolate one entity across a bracket
///
/// An entity known to only one side (spawned or despawned between ticks) is
/// carried through unmodified from that side. No extrapolation.
pub fn interpolate_entity(
    before: Option<&EntitySnapshot>,
    after: Option<&EntitySnapshot>,
    f: f32,
) -> Option<EntitySnapshot> {
    match (before, after) {
        (Some(a), Some(b)) => Some(EntitySnapshot {
            id: a.id,
            position: a.position.lerp(b.position, f),
            velocity: a.velocity.lerp(b.velocity, f),
        }),
        (Some(only), None) | (None, Some(only)) => Some(*only),
        (None, None) => None,
    }
}

/// Synthesize the world at `target_time` from a bracket
///
/// A single-snapshot bracket is returned verbatim.
pub fn interpolate_bracket(bracket: &Bracket, target_time: Duration) -> Arc<WorldSnapshot> {
    if bracket.is_single() {
        return Arc::clone(&bracket.before);
    }

    let a = &bracket.before;
    let b = &bracket.after;
    let f = interpolation_factor(a.timestamp, b.timestamp, target_time);

    let capacity = a.entities.len().max(b.entities.len());
    let mut entities = EntityMap::with_capacity_and_hasher(capacity, Default::default());

    for (id, ea) in &a.entities {
        if let Some(e) = interpolate_entity(Some(ea), b.entities.get(id), f) {
            entities.insert(*id, e);
        }
    }
    for (id, eb) in &b.entities {
        if !a.entities.contains_key(id) {
            entities.insert(*id, *eb);
        }
    }

    Arc::new(WorldSnapshot {
        timestamp: target_time,
        sequence: a.sequence,
        entities,
    })
}

/// Interpolate a single entity from a bracket, same math as [`interpolate_bracket`]
pub fn interpolate_entity_in_bracket(
    bracket: &Bracket,
    id: EntityId,
    target_time: Duration,
) -> Result<EntitySnapshot, RewindError> {
    if bracket.is_single() {
        return bracket
            .before
            .entity(id)
            .copied()
            .ok_or(RewindError::EntityNotFound(id));
    }

    let a = &bracket.before;
    let b = &bracket.after;
    let f = interpolation_factor(a.timestamp, b.timestamp, target_time);
    interpolate_entity(a.entity(id), b.entity(id), f).ok_or(RewindError::EntityNotFound(id))
}
