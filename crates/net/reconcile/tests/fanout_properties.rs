//! Property tests for the fanout-fraction invariants, run against the public facade.

use proptest::prelude::*;
use reth_tx_reconcile::{ReconciliationTracker, TrackerConfig};

fn registered_inbound_tracker(peer_count: i64) -> ReconciliationTracker {
    let tracker = ReconciliationTracker::new(TrackerConfig::default());
    for peer_id in 1..=peer_count {
        tracker.pre_register_peer(peer_id);
        tracker.enable_reconciliation_support(peer_id, true, true, false, 1, 0, 0).unwrap();
    }
    tracker
}

proptest! {
    /// For any inbound peer set and any transaction, the number of peers chosen for fanout never
    /// exceeds `ceil(N * INBOUND_FANOUT_DESTINATIONS_FRACTION)`, regardless of which wtxid is used.
    #[test]
    fn inbound_fanout_never_exceeds_the_configured_ceiling(
        peer_count in 1i64..64,
        wtxid_seed in any::<u8>(),
    ) {
        let tracker = registered_inbound_tracker(peer_count);
        let wtxid = [wtxid_seed; 32];

        let selected = (1..=peer_count)
            .filter(|&peer_id| tracker.should_fanout_to(wtxid, peer_id, 0, 0))
            .count();

        let config = TrackerConfig::default();
        let ceiling = (peer_count as f64 * config.inbound_fanout_destinations_fraction).ceil() as usize;
        prop_assert!(selected <= ceiling);
    }

    /// Subtracting already-flooded peers from the inbound target never produces a negative or
    /// out-of-range selection count.
    #[test]
    fn inbound_fanout_shrinks_monotonically_with_nonreconciling_relay(
        peer_count in 1i64..32,
        nonrcncl in 0usize..40,
    ) {
        let tracker = registered_inbound_tracker(peer_count);
        let wtxid = [7u8; 32];

        let selected = (1..=peer_count)
            .filter(|&peer_id| tracker.should_fanout_to(wtxid, peer_id, nonrcncl, 0))
            .count();

        prop_assert!(selected <= peer_count as usize);
    }

    /// An unregistered peer id is always reported as needing fanout, independent of transaction.
    #[test]
    fn unregistered_peers_always_fall_back_to_fanout(wtxid_seed in any::<u8>()) {
        let tracker = ReconciliationTracker::new(TrackerConfig::default());
        let wtxid = [wtxid_seed; 32];
        prop_assert!(tracker.should_fanout_to(wtxid, 999, 0, 0));
    }
}
