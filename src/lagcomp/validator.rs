//! Hit validation against reconstructed history
//!
//! Answers one question: is the claimed aim point within `hit_radius` of the
//! target's position as the shooter saw it? Consequences (damage, effects)
//! belong to the caller.

use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::compensator::LagCompensator;
use super::rewind::{RewindError, RewindResult};
use super::snapshot::EntityId;
use crate::util::vec2::Vec2;

/// Structural hit validation failures (a miss is not an error)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HitError {
    #[error("no snapshots available")]
    NoSnapshots,
    #[error("target not found: {0}")]
    TargetNotFound(EntityId),
    #[error("hit radius must be positive, got {0}")]
    InvalidRadius(f32),
    #[error("NaN or Infinity in aim point")]
    InvalidAimPoint,
}

impl From<RewindError> for HitError {
    fn from(e: RewindError) -> Self {
        match e {
            RewindError::NoSnapshots => HitError::NoSnapshots,
            RewindError::EntityNotFound(id) => HitError::TargetNotFound(id),
        }
    }
}

/// Hit claim as received from the network layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitClaim {
    pub shooter: EntityId,
    pub target: EntityId,
    pub aim_point: Vec2,
    pub claimed_latency: Duration,
    pub hit_radius: f32,
}

/// Outcome of a structurally valid hit check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitVerdict {
    /// `distance <= hit_radius`
    pub valid: bool,
    pub distance: f32,
    /// Target position in the reconstructed snapshot
    pub target_position: Vec2,
    pub compensated_time: Duration,
    pub actual_latency: Duration,
    /// Claimed latency was clamped into the configured bounds
    pub was_clamped: bool,
    /// Rewind target fell outside buffered history
    pub history_clamped: bool,
}

/// Check the hit geometry against a rewind result
pub fn check_hit(
    rewind: &RewindResult,
    target: EntityId,
    aim_point: Vec2,
    hit_radius: f32,
) -> Result<HitVerdict, HitError> {
    let target_state = rewind
        .snapshot
        .entity(target)
        .ok_or(HitError::TargetNotFound(target))?;

    let distance = aim_point.distance_to(target_state.position);

    Ok(HitVerdict {
        valid: distance <= hit_radius,
        distance,
        target_position: target_state.position,
        compensated_time: rewind.compensated_time,
        actual_latency: rewind.actual_latency,
        was_clamped: rewind.was_clamped,
        history_clamped: rewind.history_clamped,
    })
}

/// Cloneable validator handle for message-handling tasks
#[derive(Clone)]
pub struct HitValidator {
    compensator: Arc<LagCompensator>,
}

impl HitValidator {
    pub fn new(compensator: Arc<LagCompensator>) -> Self {
        Self { compensator }
    }

    /// `(valid, error)` for one claim; `Ok(false)` is a miss
    pub fn validate_hit(
        &self,
        shooter: EntityId,
        target: EntityId,
        aim_point: Vec2,
        claimed_latency: Duration,
        hit_radius: f32,
    ) -> Result<bool, HitError> {
        self.compensator
            .validate_hit(shooter, target, aim_point, claimed_latency, hit_radius)
    }

    pub fn validate(&self, claim: &HitClaim) -> Result<HitVerdict, HitError> {
        self.compensator.validate_hit_detailed(
            claim.shooter,
            claim.target,
            claim.aim_point,
            claim.claimed_latency,
            claim.hit_radius,
        )
    }

    /// Validate many claims in parallel; verdicts keep input order
    pub fn validate_batch(&self, claims: &[HitClaim]) -> Vec<Result<HitVerdict, HitError>> {
        claims.par_iter().map(|claim| self.validate(claim)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompensationConfig;
    use crate::lagcomp::snapshot::{EntitySnapshot, WorldSnapshot};
    use crate::util::clock::ManualClock;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn rewind_of(entities: &[(EntityId, f32, f32)]) -> RewindResult {
        let snapshot = WorldSnapshot::new(
            ms(100),
            entities
                .iter()
                .map(|&(id, x, y)| EntitySnapshot::new(id, Vec2::new(x, y), Vec2::ZERO)),
        );
        RewindResult {
            snapshot: Arc::new(snapshot),
            compensated_time: ms(100),
            actual_latency: ms(50),
            was_clamped: false,
            history_clamped: false,
        }
    }

    /// Shooter (1) at the origin, target (2) at (50, 0) and static
    fn validator() -> HitValidator {
        let clock = Arc::new(ManualClock::new(Duration::ZERO));
        let comp = LagCompensator::with_clock(CompensationConfig::default(), clock.clone());
        for i in 0..5u64 {
            clock.set(ms(i * 50));
            comp.record_snapshot([
                EntitySnapshot::new(1, Vec2::ZERO, Vec2::ZERO),
                EntitySnapshot::new(2, Vec2::new(50.0, 0.0), Vec2::ZERO),
            ])
            .unwrap();
        }
        HitValidator::new(Arc::new(comp))
    }

    #[test]
    fn test_check_hit_inside_radius() {
        let rewind = rewind_of(&[(2, 10.0, 0.0)]);
        let verdict = check_hit(&rewind, 2, Vec2::new(13.0, 4.0), 5.0).unwrap();

        assert!(verdict.valid);
        assert!((verdict.distance - 5.0).abs() < 1e-5);
        assert_eq!(verdict.target_position, Vec2::new(10.0, 0.0));
        assert_eq!(verdict.actual_latency, ms(50));
    }

    #[test]
    fn test_check_hit_on_boundary_counts() {
        let rewind = rewind_of(&[(2, 0.0, 0.0)]);
        let verdict = check_hit(&rewind, 2, Vec2::new(3.0, 4.0), 5.0).unwrap();
        assert!(verdict.valid);
    }

    #[test]
    fn test_check_hit_miss_is_not_error() {
        let rewind = rewind_of(&[(2, 0.0, 0.0)]);
        let verdict = check_hit(&rewind, 2, Vec2::new(30.0, 40.0), 5.0).unwrap();
        assert!(!verdict.valid);
        assert!((verdict.distance - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_check_hit_missing_target() {
        let rewind = rewind_of(&[(1, 0.0, 0.0)]);
        assert_eq!(
            check_hit(&rewind, 2, Vec2::ZERO, 5.0),
            Err(HitError::TargetNotFound(2))
        );
    }

    #[test]
    fn test_error_from_rewind() {
        assert_eq!(HitError::from(RewindError::NoSnapshots), HitError::NoSnapshots);
        assert_eq!(
            HitError::from(RewindError::EntityNotFound(4)),
            HitError::TargetNotFound(4)
        );
    }

    #[test]
    fn test_validator_target_fifty_units_away() {
        let validator = validator();

        // Aim exactly at the target's historical position
        assert_eq!(
            validator.validate_hit(1, 2, Vec2::new(50.0, 0.0), ms(100), 10.0),
            Ok(true)
        );
        // Five units off with a one-unit radius
        assert_eq!(
            validator.validate_hit(1, 2, Vec2::new(55.0, 0.0), ms(100), 1.0),
            Ok(false)
        );
        // Aiming at the shooter's own position misses a target 50 units away
        assert_eq!(
            validator.validate_hit(1, 2, Vec2::ZERO, ms(100), 10.0),
            Ok(false)
        );
    }

    #[test]
    fn test_validate_claim() {
        let validator = validator();
        let claim = HitClaim {
            shooter: 1,
            target: 2,
            aim_point: Vec2::new(48.0, 1.0),
            claimed_latency: ms(900),
            hit_radius: 3.0,
        };

        let verdict = validator.validate(&claim).unwrap();
        assert!(verdict.valid);
        assert!(verdict.was_clamped);
        assert_eq!(verdict.actual_latency, ms(500));
    }

    #[test]
    fn test_validate_batch_preserves_order() {
        let validator = validator();
        let claims: Vec<HitClaim> = (0..64)
            .map(|i| HitClaim {
                shooter: 1,
                target: if i % 3 == 0 { 99 } else { 2 },
                aim_point: Vec2::new(50.0 + (i % 2) as f32 * 20.0, 0.0),
                claimed_latency: ms(60),
                hit_radius: 5.0,
            })
            .collect();

        let results = validator.validate_batch(&claims);
        assert_eq!(results.len(), claims.len());

        for (i, result) in results.iter().enumerate() {
            if i % 3 == 0 {
                assert_eq!(result, &Err(HitError::TargetNotFound(99)));
            } else {
                assert_eq!(result.as_ref().unwrap().valid, i % 2 == 0);
            }
        }
    }

    #[test]
    fn test_hit_claim_serde() {
        let claim = HitClaim {
            shooter: 3,
            target: 8,
            aim_point: Vec2::new(1.0, -2.0),
            claimed_latency: ms(120),
            hit_radius: 0.75,
        };
        let json = serde_json::to_string(&claim).unwrap();
        let decoded: HitClaim = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, claim);
    }
}
