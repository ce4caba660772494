//! Lag compensator facade
//!
//! Owns the snapshot history for one match. The game loop is the single
//! writer (`record_snapshot`, once per tick); message handlers are readers
//! (`rewind_to_player_time`, `interpolate_entity_at`, `validate_hit`).
//! Each append+evict happens under the write lock, so readers never observe
//! a torn buffer. Readers clone the bracketing `Arc`s and release the lock
//! before doing any interpolation.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::buffer::{Bracket, SnapshotBuffer, SnapshotError, SnapshotStats};
use super::rewind::{
    clamp_latency, interpolate_bracket, interpolate_entity_in_bracket, RewindError, RewindResult,
};
use super::snapshot::{EntityId, EntitySnapshot, WorldSnapshot};
use super::validator::{check_hit, HitError, HitVerdict};
use crate::config::CompensationConfig;
use crate::metrics::Metrics;
use crate::util::clock::{Clock, SystemClock};
use crate::util::vec2::Vec2;

pub struct LagCompensator {
    config: CompensationConfig,
    clock: Arc<dyn Clock>,
    buffer: RwLock<SnapshotBuffer>,
    metrics: Arc<Metrics>,
}

impl LagCompensator {
    /// Compensator on the monotonic system clock
    pub fn new(config: CompensationConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Compensator on an injected clock (deterministic tests, replays)
    pub fn with_clock(config: CompensationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            buffer: RwLock::new(SnapshotBuffer::new(config.snapshot_buffer_size)),
            config,
            clock,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Report into a shared metrics registry
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[inline]
    pub fn config(&self) -> &CompensationConfig {
        &self.config
    }

    #[inline]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Current time on this compensator's clock
    #[inline]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Record the current tick's entity states, stamped with the clock
    pub fn record_snapshot(
        &self,
        entities: impl IntoIterator<Item = EntitySnapshot>,
    ) -> Result<u64, SnapshotError> {
        self.record(WorldSnapshot::new(self.clock.now(), entities))
    }

    /// Record entity states captured at an explicit timestamp
    pub fn record_snapshot_at(
        &self,
        timestamp: Duration,
        entities: impl IntoIterator<Item = EntitySnapshot>,
    ) -> Result<u64, SnapshotError> {
        self.record(WorldSnapshot::new(timestamp, entities))
    }

    /// Append a prepared snapshot; its sequence number is reassigned
    pub fn record(&self, snapshot: WorldSnapshot) -> Result<u64, SnapshotError> {
        let (result, buffered, oldest) = {
            let mut buffer = self.buffer.write();
            let result = buffer.push(snapshot);
            (result, buffer.len(), buffer.oldest().map(|s| s.timestamp))
        };

        match &result {
            Ok(sequence) => {
                self.metrics.snapshots_recorded.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .snapshots_buffered
                    .store(buffered as u64, Ordering::Relaxed);
                if let Some(oldest) = oldest {
                    self.note_oldest_age(self.clock.now().saturating_sub(oldest));
                }
                trace!("Recorded snapshot #{} ({} buffered)", sequence, buffered);
            }
            Err(e) => {
                self.metrics.snapshots_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected snapshot: {}", e);
            }
        }

        result
    }

    fn bracket_at(&self, t: Duration) -> Option<Bracket> {
        self.buffer.read().find_bracket(t)
    }

    /// Reconstruct the world as a client with `latency` saw it
    pub fn rewind_to_player_time(&self, latency: Duration) -> Result<RewindResult, RewindError> {
        let now = self.clock.now();
        let (actual_latency, was_clamped) = clamp_latency(latency, &self.config);

        if was_clamped {
            self.metrics
                .rewinds_latency_clamped
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                "Clamped latency {:?} to {:?} (bounds {:?}..={:?})",
                latency, actual_latency, self.config.min_compensation, self.config.max_compensation
            );
        }

        let compensated_time = now.saturating_sub(actual_latency);

        // No compensation: the newest snapshot as-is
        if actual_latency.is_zero() {
            let snapshot = self
                .buffer
                .read()
                .newest()
                .cloned()
                .ok_or(RewindError::NoSnapshots)?;
            self.note_rewind(actual_latency, false);
            return Ok(RewindResult {
                snapshot,
                compensated_time,
                actual_latency,
                was_clamped,
                history_clamped: false,
            });
        }

        let bracket = self
            .bracket_at(compensated_time)
            .ok_or(RewindError::NoSnapshots)?;
        let snapshot = interpolate_bracket(&bracket, compensated_time);

        self.note_rewind(actual_latency, bracket.was_clamped);
        trace!(
            "Rewound {:?} to t={:?} (#{}..#{})",
            actual_latency,
            compensated_time,
            bracket.before.sequence,
            bracket.after.sequence
        );

        Ok(RewindResult {
            snapshot,
            compensated_time,
            actual_latency,
            was_clamped,
            history_clamped: bracket.was_clamped,
        })
    }

    fn note_rewind(&self, latency: Duration, history_clamped: bool) {
        self.metrics.rewinds_total.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .last_applied_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
        if history_clamped {
            self.metrics
                .rewinds_history_clamped
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One entity's reconstructed state at an absolute time
    ///
    /// Uses the same bracket and interpolation as [`Self::rewind_to_player_time`],
    /// so debug views agree with what hit validation checks.
    pub fn interpolate_entity_at(
        &self,
        id: EntityId,
        time: Duration,
    ) -> Result<EntitySnapshot, RewindError> {
        let bracket = self.bracket_at(time).ok_or(RewindError::NoSnapshots)?;
        interpolate_entity_in_bracket(&bracket, id, time)
    }

    /// One entity's reconstructed state as seen with `latency`, clamped like a rewind
    pub fn interpolate_entity_at_latency(
        &self,
        id: EntityId,
        latency: Duration,
    ) -> Result<EntitySnapshot, RewindError> {
        let result = self.rewind_to_player_time(latency)?;
        result
            .snapshot
            .entity(id)
            .copied()
            .ok_or(RewindError::EntityNotFound(id))
    }

    /// Is the claimed hit consistent with the shooter's view of history?
    ///
    /// `Ok(false)` is a miss. Errors are structural: empty history, unknown
    /// target, non-positive radius, non-finite aim point.
    pub fn validate_hit(
        &self,
        shooter: EntityId,
        target: EntityId,
        aim_point: Vec2,
        claimed_latency: Duration,
        hit_radius: f32,
    ) -> Result<bool, HitError> {
        self.validate_hit_detailed(shooter, target, aim_point, claimed_latency, hit_radius)
            .map(|verdict| verdict.valid)
    }

    /// Like [`Self::validate_hit`], returning the full verdict
    pub fn validate_hit_detailed(
        &self,
        shooter: EntityId,
        target: EntityId,
        aim_point: Vec2,
        claimed_latency: Duration,
        hit_radius: f32,
    ) -> Result<HitVerdict, HitError> {
        let result = self.validate_inner(target, aim_point, claimed_latency, hit_radius);

        match &result {
            Ok(verdict) if verdict.valid => {
                self.metrics.hits_confirmed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Hit confirmed: {} -> {} (distance {:.2} <= {:.2}, latency {:?})",
                    shooter, target, verdict.distance, hit_radius, verdict.actual_latency
                );
            }
            Ok(verdict) => {
                self.metrics.hits_missed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Hit missed: {} -> {} (distance {:.2} > {:.2}, latency {:?})",
                    shooter, target, verdict.distance, hit_radius, verdict.actual_latency
                );
            }
            Err(e) => {
                self.metrics.hit_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Hit claim {} -> {} rejected: {}", shooter, target, e);
            }
        }

        result
    }

    fn validate_inner(
        &self,
        target: EntityId,
        aim_point: Vec2,
        claimed_latency: Duration,
        hit_radius: f32,
    ) -> Result<HitVerdict, HitError> {
        // Reject bad geometry before touching the buffer
        if !hit_radius.is_finite() || hit_radius <= 0.0 {
            return Err(HitError::InvalidRadius(hit_radius));
        }
        if !aim_point.is_finite() {
            return Err(HitError::InvalidAimPoint);
        }

        let rewind = self.rewind_to_player_time(claimed_latency)?;
        check_hit(&rewind, target, aim_point, hit_radius)
    }

    /// Newest recorded snapshot, if any
    pub fn latest_snapshot(&self) -> Option<Arc<WorldSnapshot>> {
        self.buffer.read().newest().cloned()
    }

    /// Diagnostics: buffered count, oldest age, current sequence
    pub fn stats(&self) -> SnapshotStats {
        let now = self.clock.now();
        let stats = self.buffer.read().stats(now);
        self.note_oldest_age(stats.oldest_snapshot_age);
        stats
    }

    fn note_oldest_age(&self, age: Duration) {
        self.metrics
            .oldest_snapshot_age_ms
            .store(age.as_millis() as u64, Ordering::Relaxed);
    }
}

impl Default for LagCompensator {
    fn default() -> Self {
        Self::new(CompensationConfig::default())
    }
}
