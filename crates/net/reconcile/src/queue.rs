//! Round-robin scheduling over registered initiator-role peers.

use crate::peer::PeerId;
use std::{collections::VecDeque, time::Duration};

/// Ordered set of registered peers with `we_initiate = true`, plus the wall-clock gate that
/// decides when the head becomes eligible again.
///
/// The queue itself knows nothing about `pending_request`; that flag lives on [`PeerState`]
/// because it is meaningful even for a peer that has since been rotated past the head.
///
/// [`PeerState`]: crate::peer::PeerState
#[derive(Debug, Default)]
pub(crate) struct ReconciliationQueue {
    order: VecDeque<PeerId>,
    next_recon_time: Duration,
}

impl ReconciliationQueue {
    pub(crate) fn new() -> Self {
        Self { order: VecDeque::new(), next_recon_time: Duration::ZERO }
    }

    pub(crate) fn push_back(&mut self, peer_id: PeerId) {
        debug_assert!(!self.order.contains(&peer_id), "peer {peer_id} already queued");
        self.order.push_back(peer_id);
    }

    /// Removes `peer_id` from the queue, wherever it sits. Returns `true` if it was present.
    pub(crate) fn remove(&mut self, peer_id: PeerId) -> bool {
        if let Some(idx) = self.order.iter().position(|&p| p == peer_id) {
            self.order.remove(idx);
            true
        } else {
            false
        }
    }

    pub(crate) fn head(&self) -> Option<PeerId> {
        self.order.front().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn next_recon_time(&self) -> Duration {
        self.next_recon_time
    }

    /// `RECON_REQUEST_INTERVAL` divided across the current queue size, so that any one peer is
    /// visited roughly once per interval regardless of how many peers share the queue.
    pub(crate) fn gap(&self, interval: Duration) -> Duration {
        let size = self.order.len().max(1) as u32;
        interval / size
    }

    /// Moves the head to the tail and advances `next_recon_time`. Called only once the caller
    /// has decided the head is due; does not itself check eligibility.
    pub(crate) fn rotate(&mut self, now: Duration, interval: Duration) {
        let gap = self.gap(interval);
        if let Some(head) = self.order.pop_front() {
            self.order.push_back(head);
        }
        self.next_recon_time = now + gap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(8);

    #[test]
    fn single_peer_gap_equals_full_interval() {
        let mut queue = ReconciliationQueue::new();
        queue.push_back(1);
        assert_eq!(queue.gap(INTERVAL), INTERVAL);
    }

    #[test]
    fn two_peer_queue_splits_interval_and_rotates() {
        let mut queue = ReconciliationQueue::new();
        queue.push_back(1);
        queue.push_back(2);
        assert_eq!(queue.gap(INTERVAL), Duration::from_secs(4));

        assert_eq!(queue.head(), Some(1));
        queue.rotate(Duration::from_secs(100), INTERVAL);
        assert_eq!(queue.head(), Some(2));
        assert_eq!(queue.next_recon_time(), Duration::from_secs(104));

        queue.rotate(Duration::from_secs(104), INTERVAL);
        assert_eq!(queue.head(), Some(1));
        assert_eq!(queue.next_recon_time(), Duration::from_secs(108));
    }

    #[test]
    fn removing_head_advances_to_next_peer() {
        let mut queue = ReconciliationQueue::new();
        queue.push_back(1);
        queue.push_back(2);
        queue.remove(1);
        assert_eq!(queue.head(), Some(2));
    }
}
