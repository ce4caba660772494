//! Server-side lag compensation
//!
//! - `snapshot` - world/entity snapshot data model
//! - `buffer` - bounded time-ordered snapshot history
//! - `rewind` - latency clamping and interpolation
//! - `validator` - hit validation against reconstructed history
//! - `compensator` - facade wiring the above together

pub mod buffer;
pub mod compensator;
pub mod rewind;
pub mod snapshot;
pub mod validator;

pub use buffer::{Bracket, SnapshotBuffer, SnapshotError, SnapshotStats};
pub use compensator::LagCompensator;
pub use rewind::{RewindError, RewindResult};
pub use snapshot::{EntityId, EntitySnapshot, WorldSnapshot};
pub use validator::{HitClaim, HitError, HitValidator, HitVerdict};
