//! Demo match session
//!
//! Wires a lag compensator into a running loop the way a game server would:
//! - a tokio tick loop steps the simulated world and records one snapshot per tick
//! - simulated clients send hit claims into a bounded claim queue
//! - validator worker threads drain the queue concurrently with the tick loop

pub mod claim_queue;
pub mod world;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle as TaskHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{CompensationConfig, SessionConfig};
use crate::lagcomp::{HitClaim, HitValidator, LagCompensator};
use crate::metrics::Metrics;
use crate::util::vec2::Vec2;
use claim_queue::{ClaimQueue, ClaimQueueError, ClaimReceiver, ClaimSender};
use world::SimulatedWorld;

/// Hit radius used by simulated weapons
pub const SIM_HIT_RADIUS: f32 = 12.0;
/// Share of simulated clients that overstate their latency
const CHEATER_RATIO: f64 = 0.1;
/// How often the tick loop logs compensator stats
const STATS_LOG_INTERVAL_TICKS: u64 = 200;

/// A running session; dropping it without `stop` leaks the workers
pub struct Session {
    compensator: Arc<LagCompensator>,
    shutdown: Arc<AtomicBool>,
    tick_task: TaskHandle<()>,
    client_task: TaskHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start the tick loop, simulated clients and validator workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        compensation: CompensationConfig,
        config: SessionConfig,
        metrics: Arc<Metrics>,
    ) -> std::io::Result<Self> {
        let compensation = compensation.fit_to_tick_interval(config.tick_interval());
        info!(
            "Compensation: max={:?}, min={:?}, buffer={} snapshots",
            compensation.max_compensation,
            compensation.min_compensation,
            compensation.snapshot_buffer_size
        );

        let compensator = Arc::new(LagCompensator::new(compensation).with_metrics(metrics.clone()));
        let queue = ClaimQueue::new(config.claim_buffer_size);
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers = (0..config.validator_workers)
            .map(|i| {
                let validator = HitValidator::new(compensator.clone());
                let receiver = queue.receiver();
                let shutdown = shutdown.clone();
                thread::Builder::new()
                    .name(format!("hit-validator-{}", i))
                    .spawn(move || run_validator_worker(validator, receiver, shutdown))
            })
            .collect::<std::io::Result<Vec<_>>>();
        let workers = match workers {
            Ok(workers) => workers,
            Err(e) => {
                // Already spawned workers exit on the flag
                shutdown.store(true, Ordering::Release);
                return Err(e);
            }
        };

        let tick_task = tokio::spawn(run_tick_loop(
            compensator.clone(),
            config.clone(),
            metrics.clone(),
        ));

        let client_task = tokio::spawn(run_simulated_clients(
            compensator.clone(),
            queue.sender(),
            config.clone(),
            metrics,
        ));

        info!(
            "Session started: {} entities at {} Hz, {} validator workers",
            config.entity_count, config.tick_rate, config.validator_workers
        );

        Ok(Self {
            compensator,
            shutdown,
            tick_task,
            client_task,
            workers,
        })
    }

    pub fn compensator(&self) -> &Arc<LagCompensator> {
        &self.compensator
    }

    /// Stop all tasks and join the validator workers
    pub async fn stop(self) {
        self.tick_task.abort();
        self.client_task.abort();
        self.shutdown.store(true, Ordering::Release);

        let workers = self.workers;
        let joined = tokio::task::spawn_blocking(move || {
            for worker in workers {
                if worker.join().is_err() {
                    warn!("Validator worker panicked");
                }
            }
        })
        .await;
        if let Err(e) = joined {
            warn!("Failed to join validator workers: {}", e);
        }

        let stats = self.compensator.stats();
        info!(
            "Session stopped: {} snapshots buffered, sequence {}",
            stats.total_snapshots, stats.current_sequence
        );
    }
}

/// Game loop: step the world and record one snapshot per tick
async fn run_tick_loop(
    compensator: Arc<LagCompensator>,
    config: SessionConfig,
    metrics: Arc<Metrics>,
) {
    let tick_duration = config.tick_interval();
    let dt = tick_duration.as_secs_f32();
    let mut rng = StdRng::from_entropy();
    let mut world = SimulatedWorld::new(config.entity_count, &mut rng);

    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Tick loop started at {} Hz", config.tick_rate);
    let mut tick_count: u64 = 0;

    loop {
        ticker.tick().await;
        tick_count += 1;
        let start = Instant::now();

        world.step(dt, &mut rng);
        if let Err(e) = compensator.record_snapshot(world.snapshots()) {
            warn!("Tick {}: snapshot not recorded: {}", tick_count, e);
        }

        metrics.record_tick_time(start.elapsed());

        if tick_count % STATS_LOG_INTERVAL_TICKS == 0 {
            let stats = compensator.stats();
            info!(
                "Tick {}: {} snapshots, oldest {:?}, sequence {}",
                tick_count, stats.total_snapshots, stats.oldest_snapshot_age, stats.current_sequence
            );
        }
    }
}

/// Simulated clients: build claims from what each client saw `latency` ago
async fn run_simulated_clients(
    compensator: Arc<LagCompensator>,
    sender: ClaimSender,
    config: SessionConfig,
    metrics: Arc<Metrics>,
) {
    if config.claim_rate == 0 {
        return;
    }

    let mut rng = StdRng::from_entropy();
    let mut ticker = interval(Duration::from_secs_f64(1.0 / config.claim_rate as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(claim) = simulate_claim(&compensator, config.entity_count, &mut rng) else {
            continue;
        };

        match sender.try_send(claim) {
            Ok(()) => {}
            Err(ClaimQueueError::Full) => {
                metrics.claims_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(ClaimQueueError::Disconnected) => break,
        }
    }
}

/// One simulated hit claim, or `None` before any history exists
pub fn simulate_claim<R: Rng>(
    compensator: &LagCompensator,
    entity_count: usize,
    rng: &mut R,
) -> Option<HitClaim> {
    if entity_count < 2 {
        return None;
    }

    let shooter = rng.gen_range(1..=entity_count as u64);
    let mut target = rng.gen_range(1..=entity_count as u64);
    if target == shooter {
        target = target % entity_count as u64 + 1;
    }

    let latency = Duration::from_millis(rng.gen_range(20..300));
    let seen_at = compensator.now().saturating_sub(latency);
    let seen = compensator.interpolate_entity_at(target, seen_at).ok()?;

    // Honest clients aim at what they saw, with some spread
    let spread = SIM_HIT_RADIUS * 1.5;
    let aim_point = seen.position
        + Vec2::new(rng.gen_range(-spread..spread), rng.gen_range(-spread..spread));

    // Cheaters claim far more latency than they have to reach older positions
    let claimed_latency = if rng.gen_bool(CHEATER_RATIO) {
        latency * 20
    } else {
        latency
    };

    Some(HitClaim {
        shooter,
        target,
        aim_point,
        claimed_latency,
        hit_radius: SIM_HIT_RADIUS,
    })
}

/// Validator worker: drain claims until shutdown
fn run_validator_worker(
    validator: HitValidator,
    receiver: ClaimReceiver,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Acquire) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(Some(claim)) => match validator.validate(&claim) {
                Ok(verdict) if verdict.was_clamped => {
                    debug!(
                        "Claim {} -> {} clamped from {:?} to {:?}",
                        claim.shooter, claim.target, claim.claimed_latency, verdict.actual_latency
                    );
                }
                Ok(_) => {}
                Err(e) => debug!("Claim {} -> {} failed: {}", claim.shooter, claim.target, e),
            },
            Ok(None) => {}
            Err(_) => break,
        }
    }
}
