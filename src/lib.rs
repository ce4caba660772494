//! Rewind Server Library
//!
//! Server-side lag compensation for authoritative multiplayer games: a
//! bounded history of world snapshots, clamped rewind with interpolation,
//! and hit validation against the shooter's view of the past.
//!
//! - `lagcomp` - snapshot store, rewinder, hit validator and the `LagCompensator` facade
//! - `config` - compensation presets and environment loading
//! - `metrics` - Prometheus counters for rewinds and verdicts
//! - `session` - demo match loop driving a compensator with simulated entities

pub mod config;
pub mod lagcomp;
pub mod metrics;
pub mod session;
pub mod util;

pub use config::{CompensationConfig, Preset};
pub use lagcomp::{HitError, HitValidator, LagCompensator, RewindResult};
