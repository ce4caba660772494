//! Bounded, time-ordered snapshot history
//!
//! A capped ring buffer of [`WorldSnapshot`]s in ascending timestamp order.
//! Inserting beyond capacity evicts the oldest entry; eviction is the only
//! removal path. Bracket lookups binary search the timestamps.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::snapshot::WorldSnapshot;

/// Rejections from the snapshot buffer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot out of order: last={last:?}, got={got:?}")]
    OutOfOrder { last: Duration, got: Duration },
}

/// Adjacent snapshots around a target time
///
/// `before.timestamp <= t <= after.timestamp` unless `was_clamped`, in which
/// case both ends are the oldest (or newest) buffered snapshot.
#[derive(Debug, Clone)]
pub struct Bracket {
    pub before: Arc<WorldSnapshot>,
    pub after: Arc<WorldSnapshot>,
    /// Target time fell outside the buffered window
    pub was_clamped: bool,
}

impl Bracket {
    fn single(snapshot: &Arc<WorldSnapshot>, was_clamped: bool) -> Self {
        Self {
            before: Arc::clone(snapshot),
            after: Arc::clone(snapshot),
            was_clamped,
        }
    }

    /// Both ends are the same snapshot (exact hit or exhausted history)
    #[inline]
    pub fn is_single(&self) -> bool {
        Arc::ptr_eq(&self.before, &self.after)
    }
}

/// Point-in-time buffer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub total_snapshots: usize,
    pub oldest_snapshot_age: Duration,
    pub current_sequence: u64,
    pub rejected_snapshots: u64,
    pub capacity: usize,
}

/// Ring buffer of world snapshots
#[derive(Debug)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<Arc<WorldSnapshot>>,
    capacity: usize,
    /// Sequence number of the most recently recorded snapshot (0 = none yet)
    sequence: u64,
    rejected: u64,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
            sequence: 0,
            rejected: 0,
        }
    }

    /// Append a snapshot, evicting the oldest when full
    ///
    /// Returns the sequence number assigned. A snapshot older than the newest
    /// buffered one is rejected and counted; the buffer is left untouched.
    pub fn push(&mut self, mut snapshot: WorldSnapshot) -> Result<u64, SnapshotError> {
        if let Some(newest) = self.snapshots.back() {
            if snapshot.timestamp < newest.timestamp {
                self.rejected += 1;
                return Err(SnapshotError::OutOfOrder {
                    last: newest.timestamp,
                    got: snapshot.timestamp,
                });
            }
        }

        self.sequence += 1;
        snapshot.sequence = self.sequence;

        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(Arc::new(snapshot));

        Ok(self.sequence)
    }

    /// Find the snapshots bracketing `t`
    ///
    /// Returns `None` only when the buffer is empty.
    pub fn find_bracket(&self, t: Duration) -> Option<Bracket> {
        let oldest = self.snapshots.front()?;
        let newest = self.snapshots.back()?;

        if t < oldest.timestamp {
            return Some(Bracket::single(oldest, true));
        }
        if t > newest.timestamp {
            return Some(Bracket::single(newest, true));
        }

        // First index with timestamp > t; at least 1 since oldest <= t
        let idx = self.snapshots.partition_point(|s| s.timestamp <= t);
        let before = &self.snapshots[idx - 1];

        if before.timestamp == t || idx == self.snapshots.len() {
            return Some(Bracket::single(before, false));
        }

        Some(Bracket {
            before: Arc::clone(before),
            after: Arc::clone(&self.snapshots[idx]),
            was_clamped: false,
        })
    }

    /// Most recently recorded snapshot
    pub fn newest(&self) -> Option<&Arc<WorldSnapshot>> {
        self.snapshots.back()
    }

    pub fn oldest(&self) -> Option<&Arc<WorldSnapshot>> {
        self.snapshots.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorldSnapshot>> {
        self.snapshots.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn current_sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Statistics relative to `now`
    pub fn stats(&self, now: Duration) -> SnapshotStats {
        let oldest_snapshot_age = self
            .snapshots
            .front()
            .map(|s| now.saturating_sub(s.timestamp))
            .unwrap_or(Duration::ZERO);

        SnapshotStats {
            total_snapshots: self.snapshots.len(),
            oldest_snapshot_age,
            current_sequence: self.sequence,
            rejected_snapshots: self.rejected,
            capacity: self.capacity,
        }
    }
}
