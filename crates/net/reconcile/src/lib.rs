//! Transaction-set reconciliation tracker.
//!
//! Tracks, per gossip-network peer, the handshake that opts a connection into set
//! reconciliation (BIP-330-style), the announcement set awaiting the next reconciliation round,
//! the round-robin scheduler that decides which peer to reconcile with next, and the fanout
//! policy that floods a minority of transactions the traditional way to defeat set-withholding.
//!
//! This crate does not build or decode sketches, speak the wire protocol, or touch the mempool;
//! see [`ReconciliationTracker`] for the boundary it owns versus what the relay loop around it
//! is expected to provide.

pub mod config;
pub mod error;
pub mod metrics;

mod fanout;
mod hasher;
mod queue;
mod peer;

pub use config::TrackerConfig;
pub use error::{ProtocolViolationReason, RegistrationError};
pub use hasher::{OsRngSaltSource, SaltSource};
pub use metrics::{NoopMetrics, TrackerMetrics};
pub use peer::{PeerId, Wtxid};

use error::RegistrationError::{AlreadyRegistered, NotFound, ProtocolViolation};
use hasher::ShortIdHasher;
use peer::{Phase, PeerState};
use queue::ReconciliationQueue;

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, trace};

/// Values to offer a peer during the initial handshake round, produced by
/// [`ReconciliationTracker::suggest_reconciling`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestedReconciliation {
    /// Whether we will request sketches from this peer.
    pub we_initiate: bool,
    /// Whether we will honor this peer's sketch requests.
    pub we_respond: bool,
    /// Our maximum supported protocol version.
    pub version: u32,
    /// The salt generated for this peer, to be sent in the offer.
    pub local_salt: u64,
}

/// Parameters for an outgoing reconciliation request, produced by
/// [`ReconciliationTracker::initiate_reconciliation_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationRequest {
    /// Size of our local announcement set for this peer.
    pub local_set_size: usize,
    /// `q`, the estimated set-difference density, encoded as a fraction of
    /// [`config::Q_PRECISION`].
    pub q_formatted: u16,
}

/// A thread-safe, cloneable handle to the tracker.
///
/// Cloning is cheap: it shares the same underlying state via an [`Arc`]. All public methods lock
/// a single internal mutex for their duration; none of them block on I/O or suspend, so contention
/// between the scheduler thread and the per-peer message workers is expected to be negligible.
#[derive(Clone, Debug)]
pub struct ReconciliationTracker {
    inner: Arc<Inner>,
}

struct Inner {
    config: TrackerConfig,
    /// Per-process secret mixed into the permanent "chosen for flooding" bit (§4.3a), so an
    /// adversary observing which peers get redundant fanout on this node cannot infer anything
    /// that transfers to another node.
    process_secret: u64,
    salt_source: Box<dyn SaltSource>,
    metrics: Box<dyn TrackerMetrics>,
    state: Mutex<State>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("config", &self.config)
            .field("process_secret", &"<redacted>")
            .field("salt_source", &"Box<dyn SaltSource>")
            .field("metrics", &"Box<dyn TrackerMetrics>")
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Debug)]
struct State {
    peers: HashMap<PeerId, PeerState>,
    queue: ReconciliationQueue,
}

// === impl ReconciliationTracker ===

impl ReconciliationTracker {
    /// Creates a tracker using the OS random number generator for salts and discarding all
    /// metrics.
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_collaborators(config, Box::new(OsRngSaltSource), Box::new(NoopMetrics))
    }

    /// Creates a tracker with explicit collaborators, e.g. a deterministic [`SaltSource`] for
    /// tests or a [`TrackerMetrics`] wired into an exporter.
    pub fn with_collaborators(
        config: TrackerConfig,
        salt_source: Box<dyn SaltSource>,
        metrics: Box<dyn TrackerMetrics>,
    ) -> Self {
        let process_secret = salt_source.next_salt();
        Self {
            inner: Arc::new(Inner {
                config,
                process_secret,
                salt_source,
                metrics,
                state: Mutex::new(State { peers: HashMap::new(), queue: ReconciliationQueue::new() }),
            }),
        }
    }

    /// Produces the offer values for a fresh peer and records it as `PreRegistered`.
    ///
    /// Calling this twice for the same `peer_id` overwrites the previous pre-registration; the
    /// caller is expected not to do so for a peer it has already offered reconciliation to.
    pub fn suggest_reconciling(&self, peer_id: PeerId, is_inbound: bool) -> SuggestedReconciliation {
        let local_salt = self.inner.salt_source.next_salt();
        {
            let mut state = self.inner.state.lock();
            state.peers.insert(peer_id, PeerState::pre_registered(local_salt));
        }

        trace!(target: "net::recon", peer_id, is_inbound, "suggested reconciling with peer");

        SuggestedReconciliation {
            we_initiate: !is_inbound,
            we_respond: is_inbound,
            version: self.inner.config.protocol_version,
            local_salt,
        }
    }

    /// Lightweight pre-registration with a zero salt, for callers that skip the
    /// `suggest_reconciling`/`enable_reconciliation_support` split.
    pub fn pre_register_peer(&self, peer_id: PeerId) {
        let mut state = self.inner.state.lock();
        state.peers.insert(peer_id, PeerState::pre_registered(0));
    }

    /// Completes the handshake for a peer that has accepted the offer, or responds with its own
    /// offer. See module docs and the crate's `SPEC_FULL.md` for the exact validation contract.
    pub fn enable_reconciliation_support(
        &self,
        peer_id: PeerId,
        is_inbound: bool,
        recon_requestor: bool,
        recon_responder: bool,
        version: u32,
        remote_salt: u64,
        outbound_flooders: usize,
    ) -> Result<(), RegistrationError> {
        let mut state = self.inner.state.lock();

        let local_salt = match state.peers.get(&peer_id) {
            None => return Err(NotFound(peer_id)),
            Some(peer) if peer.is_registered() => return Err(AlreadyRegistered(peer_id)),
            Some(PeerState { phase: Phase::PreRegistered { local_salt }, .. }) => *local_salt,
            Some(PeerState { phase: Phase::Registered, .. }) => unreachable!("matched above"),
        };

        if version == 0 {
            return Err(ProtocolViolation(peer_id, ProtocolViolationReason::ZeroVersion))
        }
        if is_inbound && !recon_requestor {
            return Err(ProtocolViolation(peer_id, ProtocolViolationReason::InboundPeerNotRequestor))
        }
        if !is_inbound && !recon_responder {
            return Err(ProtocolViolation(peer_id, ProtocolViolationReason::OutboundPeerNotResponder))
        }

        // `outbound_flooders` is part of the handshake contract but, per §4.3a, the permanent
        // fanout-chosen bit depends only on the peer id and the per-process secret.
        let _ = outbound_flooders;

        let we_initiate = !is_inbound;
        let negotiated_version = version.min(self.inner.config.protocol_version);
        let hasher = if we_initiate {
            ShortIdHasher::from_salts(local_salt, remote_salt)
        } else {
            ShortIdHasher::from_salts(remote_salt, local_salt)
        };
        let chosen_for_fanout = fanout::is_chosen_for_fanout(
            peer_id,
            self.inner.process_secret,
            self.inner.config.chosen_for_fanout_fraction,
        );

        let peer = state.peers.get_mut(&peer_id).expect("checked present above");
        peer.phase = Phase::Registered;
        peer.is_inbound = is_inbound;
        peer.we_initiate = we_initiate;
        peer.they_respond = we_initiate;
        peer.version = negotiated_version;
        peer.short_id_hasher = Some(hasher);
        peer.chosen_for_fanout = chosen_for_fanout;

        if we_initiate {
            state.queue.push_back(peer_id);
        }

        debug!(
            target: "net::recon",
            peer_id, is_inbound, version = negotiated_version, chosen_for_fanout,
            "peer registered for reconciliation"
        );
        self.inner.metrics.peer_registered();

        Ok(())
    }

    /// Removes a peer entirely. Idempotent.
    pub fn forget_peer(&self, peer_id: PeerId) {
        let mut state = self.inner.state.lock();
        if state.peers.remove(&peer_id).is_some() {
            state.queue.remove(peer_id);
            trace!(target: "net::recon", peer_id, "peer forgotten");
            self.inner.metrics.peer_forgotten();
        }
    }

    /// Returns `true` iff `peer_id` has completed the handshake.
    pub fn is_peer_registered(&self, peer_id: PeerId) -> bool {
        self.inner.state.lock().peers.get(&peer_id).is_some_and(PeerState::is_registered)
    }

    /// Inserts each transaction id into `peer_id`'s announcement set, unless the fanout selector
    /// says it should instead be flooded immediately. Returns the subset of `txs` selected for
    /// fanout; the caller is responsible for transmitting those to `peer_id` right away.
    ///
    /// No-op (returns an empty vector) if `peer_id` is not registered.
    pub fn store_txs_to_announce(
        &self,
        peer_id: PeerId,
        txs: impl IntoIterator<Item = Wtxid>,
        inbounds_nonrcncl_tx_relay: usize,
        outbounds_nonrcncl_tx_relay: usize,
    ) -> Vec<Wtxid> {
        let mut state = self.inner.state.lock();
        let mut fanout_now = Vec::new();

        if !state.peers.get(&peer_id).is_some_and(PeerState::is_registered) {
            return fanout_now
        }

        for wtxid in txs {
            let fanout_selected = Self::should_fanout_to_locked(
                &state,
                &self.inner.config,
                wtxid,
                peer_id,
                inbounds_nonrcncl_tx_relay,
                outbounds_nonrcncl_tx_relay,
            );

            if fanout_selected {
                fanout_now.push(wtxid);
            } else if let Some(peer) = state.peers.get_mut(&peer_id) {
                peer.announcement_set.insert(wtxid);
            }
        }

        if !fanout_now.is_empty() {
            let is_inbound = state.peers[&peer_id].is_inbound;
            self.inner.metrics.fanout_chosen(is_inbound);
        }

        fanout_now
    }

    /// Size of `peer_id`'s announcement set, or `None` if unregistered.
    pub fn get_peer_set_size(&self, peer_id: PeerId) -> Option<usize> {
        let state = self.inner.state.lock();
        let peer = state.peers.get(&peer_id)?;
        peer.is_registered().then(|| peer.announcement_set.len())
    }

    /// Decides whether `wtxid` should be flooded to `peer_id` rather than reconciled.
    ///
    /// Returns `true` unconditionally for peers not registered for reconciliation (fall back to
    /// full flooding). Otherwise ranks all registered peers of the same direction under a
    /// transaction-keyed hash and selects the top `K`, where `K` is derived from the configured
    /// fanout fraction/count minus transactions already flooded through non-reconciling relay.
    pub fn should_fanout_to(
        &self,
        wtxid: Wtxid,
        peer_id: PeerId,
        inbounds_nonrcncl_tx_relay: usize,
        outbounds_nonrcncl_tx_relay: usize,
    ) -> bool {
        let state = self.inner.state.lock();
        Self::should_fanout_to_locked(
            &state,
            &self.inner.config,
            wtxid,
            peer_id,
            inbounds_nonrcncl_tx_relay,
            outbounds_nonrcncl_tx_relay,
        )
    }

    fn should_fanout_to_locked(
        state: &State,
        config: &TrackerConfig,
        wtxid: Wtxid,
        peer_id: PeerId,
        inbounds_nonrcncl_tx_relay: usize,
        outbounds_nonrcncl_tx_relay: usize,
    ) -> bool {
        let Some(peer) = state.peers.get(&peer_id) else { return true };
        if !peer.is_registered() {
            return true
        }
        let Some(short_id_hasher) = &peer.short_id_hasher else { return true };

        let same_direction: Vec<PeerId> = state
            .peers
            .iter()
            .filter(|(_, candidate)| candidate.is_registered() && candidate.is_inbound == peer.is_inbound)
            .map(|(&id, _)| id)
            .collect();

        let k = if peer.is_inbound {
            fanout::inbound_k(
                same_direction.len(),
                config.inbound_fanout_destinations_fraction,
                inbounds_nonrcncl_tx_relay,
            )
        } else {
            fanout::outbound_k(config.outbound_fanout_destinations, outbounds_nonrcncl_tx_relay)
        };

        fanout::is_top_k_selected(&wtxid, short_id_hasher, peer_id, same_direction.into_iter(), k)
    }

    /// The only scheduling operation: `true` iff `peer_id` is both the current queue head and
    /// due. As a side effect of returning `true`, rotates the queue and clears the peer's
    /// pending-request flag, so callers must treat the result as a single-visit ticket.
    pub fn is_peer_next_to_reconcile_with(&self, peer_id: PeerId, now: Duration) -> bool {
        let mut state = self.inner.state.lock();

        let Some(peer) = state.peers.get(&peer_id) else { return false };
        if !peer.is_registered() || !peer.we_initiate {
            return false
        }
        let pending_request = peer.pending_request;

        if now < state.queue.next_recon_time() {
            return false
        }

        match state.queue.head() {
            Some(head) if head == peer_id => {}
            _ => return false,
        }

        if pending_request {
            let timeout_deadline = state.queue.next_recon_time() + self.inner.config.recon_response_timeout;
            if now < timeout_deadline {
                return false
            }
        }

        state.queue.rotate(now, self.inner.config.recon_request_interval);
        if let Some(peer) = state.peers.get_mut(&peer_id) {
            peer.pending_request = false;
            peer.last_request_time = Some(now);
        }

        trace!(target: "net::recon", peer_id, "peer due for reconciliation, queue rotated");
        self.inner.metrics.queue_rotated();

        true
    }

    /// Produces the parameters for an outgoing reconciliation request and marks the peer as
    /// having one in flight. Returns `None` if the peer is not a registered initiator, or already
    /// has a pending request.
    pub fn initiate_reconciliation_request(&self, peer_id: PeerId) -> Option<ReconciliationRequest> {
        let mut state = self.inner.state.lock();
        let peer = state.peers.get_mut(&peer_id)?;

        if !peer.is_registered() || !peer.we_initiate || peer.pending_request {
            return None
        }

        let local_set_size = peer.announcement_set.len();
        let q_formatted = self.inner.config.format_q(self.inner.config.default_q);
        peer.pending_request = true;

        Some(ReconciliationRequest { local_set_size, q_formatted })
    }

    /// Clears `peer_id`'s pending-request flag once its sketch response has arrived. No-op for
    /// unknown or unregistered peers.
    pub fn note_reconciliation_response(&self, peer_id: PeerId) {
        let mut state = self.inner.state.lock();
        if let Some(peer) = state.peers.get_mut(&peer_id) {
            peer.pending_request = false;
        }
    }

    /// Returns the stored "chosen for flooding" bit, or `None` for an unregistered peer.
    pub fn is_peer_chosen_for_flooding(&self, peer_id: PeerId) -> Option<bool> {
        let state = self.inner.state.lock();
        let peer = state.peers.get(&peer_id)?;
        peer.is_registered().then_some(peer.chosen_for_fanout)
    }
}

impl Default for ReconciliationTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ReconciliationTracker {
        ReconciliationTracker::new(TrackerConfig::default())
    }

    fn register_outbound(tracker: &ReconciliationTracker, peer_id: PeerId) {
        tracker.pre_register_peer(peer_id);
        tracker
            .enable_reconciliation_support(peer_id, false, false, true, 1, 0, 0)
            .expect("registration should succeed");
    }

    fn register_inbound(tracker: &ReconciliationTracker, peer_id: PeerId) {
        tracker.pre_register_peer(peer_id);
        tracker
            .enable_reconciliation_support(peer_id, true, true, false, 1, 0, 0)
            .expect("registration should succeed");
    }

    #[test]
    fn registration_round_trip() {
        let tracker = tracker();
        tracker.pre_register_peer(0);
        assert_eq!(tracker.enable_reconciliation_support(0, true, true, false, 1, 0, 0), Ok(()));
        assert!(tracker.is_peer_registered(0));
        assert_eq!(
            tracker.enable_reconciliation_support(0, true, true, false, 1, 0, 0),
            Err(AlreadyRegistered(0))
        );
        tracker.forget_peer(0);
        assert!(!tracker.is_peer_registered(0));
    }

    #[test]
    fn register_without_pre_registration_is_not_found() {
        let tracker = tracker();
        assert_eq!(
            tracker.enable_reconciliation_support(0, true, true, false, 1, 0, 0),
            Err(NotFound(0))
        );
    }

    #[test]
    fn zero_version_is_a_protocol_violation() {
        let tracker = tracker();
        tracker.pre_register_peer(0);
        assert_eq!(
            tracker.enable_reconciliation_support(0, true, true, false, 0, 0, 0),
            Err(ProtocolViolation(0, ProtocolViolationReason::ZeroVersion))
        );
    }

    #[test]
    fn role_mismatch_is_a_protocol_violation() {
        let tracker = tracker();
        tracker.pre_register_peer(0);
        assert_eq!(
            tracker.enable_reconciliation_support(0, false, false, false, 1, 0, 0),
            Err(ProtocolViolation(0, ProtocolViolationReason::OutboundPeerNotResponder))
        );
    }

    #[test]
    fn fanout_to_single_outbound_reconciling_peer() {
        let tracker = tracker();
        register_outbound(&tracker, 0);

        for i in 0..100u8 {
            let wtxid = [i; 32];
            assert!(tracker.should_fanout_to(wtxid, 0, 0, 0));
        }
        for i in 0..100u8 {
            let wtxid = [i; 32];
            assert!(!tracker.should_fanout_to(wtxid, 0, 0, 1));
        }
    }

    #[test]
    fn inbound_fanout_fraction() {
        let tracker = tracker();
        for peer_id in 1..=30 {
            register_inbound(&tracker, peer_id);
        }

        for i in 0..100u8 {
            let wtxid = [i; 32];
            let selected = (1..=30).filter(|&p| tracker.should_fanout_to(wtxid, p, 0, 0)).count();
            assert_eq!(selected, 3);
        }
        for i in 0..100u8 {
            let wtxid = [i; 32];
            let selected = (1..=30).filter(|&p| tracker.should_fanout_to(wtxid, p, 4, 0)).count();
            assert_eq!(selected, 0);
        }
    }

    #[test]
    fn unregistered_peer_always_fanouts() {
        let tracker = tracker();
        tracker.pre_register_peer(7);
        assert!(tracker.should_fanout_to([1u8; 32], 7, 0, 0));
        assert!(tracker.should_fanout_to([1u8; 32], 999, 0, 0));
    }

    #[test]
    fn initiate_request_parameters() {
        let tracker = tracker();
        register_outbound(&tracker, 0);

        assert_eq!(
            tracker.initiate_reconciliation_request(0),
            Some(ReconciliationRequest { local_set_size: 0, q_formatted: 8191 })
        );

        // a pending request blocks a second one
        assert_eq!(tracker.initiate_reconciliation_request(0), None);
        tracker.note_reconciliation_response(0);

        tracker.store_txs_to_announce(0, [[1u8; 32], [2u8; 32], [3u8; 32]], 0, 1);
        assert_eq!(
            tracker.initiate_reconciliation_request(0),
            Some(ReconciliationRequest { local_set_size: 3, q_formatted: 8191 })
        );
    }

    #[test]
    fn queue_rotation_with_two_peers() {
        let tracker = tracker();
        register_outbound(&tracker, 1);
        register_outbound(&tracker, 2);

        assert!(tracker.is_peer_next_to_reconcile_with(1, Duration::from_secs(100)));
        assert!(!tracker.is_peer_next_to_reconcile_with(2, Duration::from_secs(100)));

        assert!(tracker.is_peer_next_to_reconcile_with(2, Duration::from_secs(104)));
        assert!(!tracker.is_peer_next_to_reconcile_with(1, Duration::from_secs(107)));
        assert!(tracker.is_peer_next_to_reconcile_with(1, Duration::from_secs(110)));
    }

    #[test]
    fn pending_request_gates_until_response_or_timeout() {
        let tracker = tracker();
        register_outbound(&tracker, 1);
        register_outbound(&tracker, 2);

        assert!(tracker.is_peer_next_to_reconcile_with(1, Duration::from_secs(100)));
        tracker.initiate_reconciliation_request(1);

        assert!(tracker.is_peer_next_to_reconcile_with(2, Duration::from_secs(104)));
        // peer 1 is due again at t=108, but still has a response outstanding
        assert!(!tracker.is_peer_next_to_reconcile_with(1, Duration::from_secs(108)));
        // within RECON_RESPONSE_TIMEOUT of becoming due, still gated
        assert!(!tracker.is_peer_next_to_reconcile_with(1, Duration::from_secs(109)));
        // past the timeout, it's allowed through even without an explicit response
        assert!(tracker.is_peer_next_to_reconcile_with(1, Duration::from_secs(111)));
    }

    #[test]
    fn forgetting_the_head_advances_the_queue() {
        let tracker = tracker();
        register_outbound(&tracker, 1);
        register_outbound(&tracker, 2);

        tracker.forget_peer(1);
        assert!(tracker.is_peer_next_to_reconcile_with(2, Duration::from_secs(0)));
    }

    #[test]
    fn store_txs_to_announce_skips_duplicates() {
        let tracker = tracker();
        register_outbound(&tracker, 0);

        tracker.store_txs_to_announce(0, [[1u8; 32]], 0, 1);
        tracker.store_txs_to_announce(0, [[1u8; 32]], 0, 1);
        assert_eq!(tracker.get_peer_set_size(0), Some(1));
    }
}
