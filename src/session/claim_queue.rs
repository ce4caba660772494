//! Lock-free hit-claim queue
//!
//! Uses crossbeam-channel for MPMC hand-off from message handlers to the
//! validator workers, so submitting a claim never blocks a network task.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::lagcomp::HitClaim;

/// Bounded queue of pending hit claims
pub struct ClaimQueue {
    sender: Sender<HitClaim>,
    receiver: Receiver<HitClaim>,
}

impl ClaimQueue {
    /// Capacity should cover claim bursts between validator wakeups
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Sender handle for one message handler
    pub fn sender(&self) -> ClaimSender {
        ClaimSender {
            sender: self.sender.clone(),
        }
    }

    /// Receiver handle for one validator worker
    pub fn receiver(&self) -> ClaimReceiver {
        ClaimReceiver {
            receiver: self.receiver.clone(),
        }
    }
}

/// Claim queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClaimQueueError {
    #[error("claim queue is full")]
    Full,
    #[error("claim queue disconnected")]
    Disconnected,
}

/// Clonable sender handle for message handlers
#[derive(Clone)]
pub struct ClaimSender {
    sender: Sender<HitClaim>,
}

impl ClaimSender {
    /// Submit a claim (non-blocking); `Full` signals backpressure
    #[inline]
    pub fn try_send(&self, claim: HitClaim) -> Result<(), ClaimQueueError> {
        self.sender.try_send(claim).map_err(|e| match e {
            TrySendError::Full(_) => ClaimQueueError::Full,
            TrySendError::Disconnected(_) => ClaimQueueError::Disconnected,
        })
    }
}

/// Clonable receiver handle for validator workers
#[derive(Clone)]
pub struct ClaimReceiver {
    receiver: Receiver<HitClaim>,
}

impl ClaimReceiver {
    /// Wait up to `timeout` for the next claim
    ///
    /// `Ok(None)` on timeout so workers can poll their shutdown flag.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<HitClaim>, ClaimQueueError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(claim) => Ok(Some(claim)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ClaimQueueError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;

    const WAIT: Duration = Duration::from_millis(50);

    fn claim(target: u64) -> HitClaim {
        HitClaim {
            shooter: 1,
            target,
            aim_point: Vec2::new(1.0, 2.0),
            claimed_latency: Duration::from_millis(80),
            hit_radius: 2.0,
        }
    }

    fn received_target(receiver: &ClaimReceiver) -> Option<u64> {
        receiver.recv_timeout(WAIT).unwrap().map(|c| c.target)
    }

    #[test]
    fn test_claims_arrive_in_order() {
        let queue = ClaimQueue::new(10);
        let sender = queue.sender();
        let receiver = queue.receiver();

        for target in 1..=3 {
            sender.try_send(claim(target)).unwrap();
        }

        assert_eq!(received_target(&receiver), Some(1));
        assert_eq!(received_target(&receiver), Some(2));
        assert_eq!(received_target(&receiver), Some(3));
        assert_eq!(receiver.recv_timeout(Duration::from_millis(5)), Ok(None));
    }

    #[test]
    fn test_backpressure() {
        let queue = ClaimQueue::new(2);
        let sender = queue.sender();

        assert!(sender.try_send(claim(1)).is_ok());
        assert!(sender.try_send(claim(2)).is_ok());
        assert_eq!(sender.try_send(claim(3)), Err(ClaimQueueError::Full));

        assert_eq!(received_target(&queue.receiver()), Some(1));
        assert!(sender.try_send(claim(3)).is_ok());
    }

    #[test]
    fn test_receiver_timeout_and_receive() {
        let queue = ClaimQueue::new(4);
        let receiver = queue.receiver();

        assert_eq!(receiver.recv_timeout(Duration::from_millis(5)), Ok(None));

        queue.sender().try_send(claim(9)).unwrap();
        assert_eq!(received_target(&receiver), Some(9));
    }

    #[test]
    fn test_multiple_senders_and_receivers() {
        let queue = ClaimQueue::new(10);
        let a = queue.sender();
        let b = queue.sender();

        a.try_send(claim(1)).unwrap();
        b.try_send(claim(2)).unwrap();

        let first = queue.receiver();
        let second = queue.receiver();
        let mut targets = vec![
            received_target(&first).unwrap(),
            received_target(&second).unwrap(),
        ];
        targets.sort_unstable();
        assert_eq!(targets, vec![1, 2]);
    }

    #[test]
    fn test_disconnected_once_queue_dropped() {
        let queue = ClaimQueue::new(4);
        let sender = queue.sender();
        let receiver = queue.receiver();
        drop(queue);
        drop(receiver);

        assert_eq!(sender.try_send(claim(1)), Err(ClaimQueueError::Disconnected));
    }
}
