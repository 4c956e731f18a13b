//! Deterministic, stateless fanout selection.
//!
//! Two independent decisions live here: the permanent "chosen for flooding" bit assigned to a
//! handful of registered peers at registration time (§4.3a), and the per-transaction dynamic
//! decision made on every announcement (§4.3b). Neither reads or mutates tracker state beyond
//! what is passed in, which is what lets [`ReconciliationTracker::should_fanout_to`] be called
//! from multiple threads without additional synchronization beyond the lock already held to read
//! the peer set.
//!
//! [`ReconciliationTracker::should_fanout_to`]: crate::ReconciliationTracker::should_fanout_to

use crate::{
    hasher::ShortIdHasher,
    peer::{PeerId, Wtxid},
};
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

/// Decides whether `peer_id` is one of the permanently fanout-chosen peers.
///
/// Deterministic given `(peer_id, process_secret)`: an adversary who doesn't know the process
/// secret cannot predict or influence which peers are chosen, but the node itself gets a stable
/// answer across repeated registrations within the same process lifetime. `fraction` is
/// [`TrackerConfig::chosen_for_fanout_fraction`](crate::config::TrackerConfig::chosen_for_fanout_fraction).
pub(crate) fn is_chosen_for_fanout(peer_id: PeerId, process_secret: u64, fraction: f64) -> bool {
    let mut hasher = SipHasher24::new_with_keys(process_secret, process_secret);
    hasher.write_i64(peer_id);
    let rank = hasher.finish();
    (rank as f64 / u64::MAX as f64) < fraction
}

/// Number of outbound peers that should additionally receive fanout for a given transaction,
/// after accounting for peers already flooding it through non-reconciling relay.
pub(crate) fn outbound_k(outbound_fanout_destinations: usize, outbounds_nonrcncl_tx_relay: usize) -> usize {
    outbound_fanout_destinations.saturating_sub(outbounds_nonrcncl_tx_relay)
}

/// Number of inbound peers that should additionally receive fanout for a given transaction,
/// after accounting for peers already flooding it through non-reconciling relay.
pub(crate) fn inbound_k(
    registered_inbound: usize,
    inbound_fanout_destinations_fraction: f64,
    inbounds_nonrcncl_tx_relay: usize,
) -> usize {
    let target = (registered_inbound as f64 * inbound_fanout_destinations_fraction).ceil() as i64;
    (target - inbounds_nonrcncl_tx_relay as i64).max(0) as usize
}

/// Returns `true` if `peer_id`'s rank, under `hasher`, is among the lowest `k` of
/// `same_direction_peers` (which must include `peer_id` itself to be meaningful).
///
/// `hasher` ranks deterministically: calling it twice with the same `(wtxid, peer_id)` always
/// yields the same value, and it must not be reseeded between calls within one decision.
pub(crate) fn is_top_k_selected(
    wtxid: &Wtxid,
    hasher: &ShortIdHasher,
    peer_id: PeerId,
    same_direction_peers: impl Iterator<Item = PeerId>,
    k: usize,
) -> bool {
    if k == 0 {
        return false
    }

    let target_rank = hasher.rank(wtxid, peer_id);
    let peers_ranked_lower = same_direction_peers
        .filter(|&candidate| candidate != peer_id)
        .filter(|&candidate| hasher.rank(wtxid, candidate) < target_rank)
        .count();

    peers_ranked_lower < k
}
